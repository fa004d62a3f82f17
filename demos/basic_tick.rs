//! A small funding network ticked forward by hand.
//!
//! Two players fund policies, policies feed goals, and each tick leaks a
//! little from every node before passing money downstream.

use funding_network::prelude::*;
use rust_decimal_macros::dec;

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  funding-network: Basic Tick Example     ║");
    println!("╚══════════════════════════════════════════╝\n");

    let network = FundingNetwork::new();

    let peace = network.add_goal("World Peace", dec!(0.05)).unwrap();
    let air = network.add_goal("Clean Air", dec!(0.05)).unwrap();
    let embargo = network.add_policy("Arms Embargo", dec!(0.1)).unwrap();
    let bikes = network.add_policy("Bike Lanes", dec!(0.1)).unwrap();
    let trees = network.add_policy("Tree Planting", dec!(0.1)).unwrap();

    network.add_link(&embargo, &peace, dec!(20)).unwrap();
    network.add_link(&bikes, &air, dec!(15)).unwrap();
    network.add_link(&bikes, &trees, dec!(10)).unwrap();
    network.add_link(&trees, &air, dec!(8)).unwrap();

    let matt = network.add_player("Matt", dec!(100), dec!(1000)).unwrap();
    let simon = network.add_player("Simon", dec!(100), dec!(1000)).unwrap();
    network.set_player_goal(&matt, &peace).unwrap();
    network.set_player_goal(&simon, &air).unwrap();
    network.do_replenish_budget().unwrap();

    network.fund(&matt, &embargo, dec!(40)).unwrap();
    network.fund(&matt, &bikes, dec!(10)).unwrap();
    network.fund(&simon, &bikes, dec!(60)).unwrap();

    // --- Ticks ---
    println!("━━━ Ten ticks ━━━\n");
    for tick in 1..=10 {
        let report = network.tick().unwrap();
        println!(
            "  tick {:>2}: leaked {:>8}  forwarded {:>8}",
            tick,
            report.leaked.round_dp(2),
            report.forwarded.round_dp(2)
        );
    }
    println!();

    // --- Balances ---
    println!("━━━ Balances ━━━\n");
    let topology = network.topology();
    for id in topology.ranked_order() {
        let node = topology.node(id).unwrap();
        println!(
            "  {:<14} {:<7} rank {:>2}  {:>10}",
            node.name(),
            node.kind(),
            node.rank(),
            node.balance().round_dp(2)
        );
    }
    drop(topology);
    println!();

    // --- Attribution ---
    println!("━━━ Who paid into the goals ━━━\n");
    for (name, goal) in [("World Peace", &peace), ("Clean Air", &air)] {
        let wallet = network.wallet(goal).unwrap();
        println!(
            "  {:<12} Matt {:>8}  Simon {:>8}",
            name,
            wallet.owned_by(&matt).round_dp(2),
            wallet.owned_by(&simon).round_dp(2)
        );
    }
}
