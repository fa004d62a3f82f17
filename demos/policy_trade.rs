//! Offering and buying a policy between two players.
//!
//! Shows the signed offer, a tampered copy being rejected, the honest
//! purchase, and the same offer failing a second time.

use funding_network::game::network_def::NodeDefinition;
use funding_network::prelude::*;
use rust_decimal_macros::dec;

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  funding-network: Policy Trade Example   ║");
    println!("╚══════════════════════════════════════════╝\n");

    let game = Game::new(GameConfig {
        seed: Some(7),
        policies_per_player: 0,
        ..GameConfig::default()
    })
    .unwrap();
    let definition = NetworkDefinition {
        goals: vec![NodeDefinition::new("g1", "World Peace", dec!(0.1))],
        policies: vec![
            NodeDefinition::new("p1", "Arms Embargo", dec!(0.1)).connect("l1", "g1", dec!(5)),
            NodeDefinition::new("p2", "Peace Talks", dec!(0.1)).connect("l2", "g1", dec!(3)),
        ],
    };
    game.create_network(&definition).unwrap();

    let matt = game.create_player("Matt").unwrap();
    let simon = game.create_player("Simon").unwrap();
    let policy = NodeId::new("p1");
    game.network().fund(&matt, &policy, dec!(0)).unwrap();

    let offer = game.offer_policy(&matt, &policy, Some(dec!(5000))).unwrap();
    println!("Offer:    {} sells {} for {}", offer.seller_id, offer.policy_id, offer.price);
    println!("Checksum: {}\n", offer.checksum);

    let mut tampered = offer.clone();
    tampered.price = dec!(1);
    match game.buy_policy(&simon, &tampered) {
        Ok(()) => println!("Tampered offer accepted (unexpected)"),
        Err(e) => println!("Tampered offer rejected: {}", e),
    }

    match game.buy_policy(&simon, &offer) {
        Ok(()) => println!("Simon bought {}", policy),
        Err(e) => println!("Purchase failed: {}", e),
    }
    match game.buy_policy(&simon, &offer) {
        Ok(()) => println!("Replay accepted (unexpected)"),
        Err(e) => println!("Replay rejected: {}", e),
    }
    println!();

    for id in [&matt, &simon] {
        let view = game.player(id).unwrap();
        let owned: Vec<String> = view.policies.into_iter().map(|p| p.name).collect();
        println!("  {:<6} balance {:>10}  owns {}", view.name, view.balance, owned.join(", "));
    }
}
