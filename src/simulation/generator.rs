//! Random network generation for the CLI, benchmarks and property tests.

use crate::core::node::NodeId;
use crate::engine::FundingRequest;
use crate::error::EngineError;
use crate::game::network_def::{NetworkDefinition, NodeDefinition};
use crate::game::Game;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Shape of a randomly generated network.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub policy_count: usize,
    pub goal_count: usize,
    /// Policies are spread over this many layers; links only point to later
    /// layers or to goals, so the result is always acyclic.
    pub layers: usize,
    pub links_per_policy: usize,
    pub min_weight: Decimal,
    pub max_weight: Decimal,
    pub max_leak: Decimal,
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            policy_count: 30,
            goal_count: 6,
            layers: 3,
            links_per_policy: 2,
            min_weight: Decimal::ONE,
            max_weight: Decimal::from(50),
            max_leak: Decimal::new(2, 1),
            seed: None,
        }
    }
}

fn to_hundredths(value: Decimal, fallback: i64) -> i64 {
    (value * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or(fallback)
        .max(0)
}

/// Generate a random layered network definition.
pub fn generate_network(config: &GeneratorConfig) -> NetworkDefinition {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let layers = config.layers.max(1);

    let min_weight = to_hundredths(config.min_weight, 100);
    let max_weight = to_hundredths(config.max_weight, 5000).max(min_weight);
    let max_leak = to_hundredths(config.max_leak.min(Decimal::ONE), 20);

    let random_leak = |rng: &mut StdRng| Decimal::new(rng.gen_range(0..=max_leak), 2);

    let goals: Vec<NodeDefinition> = (0..config.goal_count)
        .map(|i| {
            let mut goal = NodeDefinition::new(
                format!("goal-{:03}", i),
                format!("Goal {}", i + 1),
                random_leak(&mut rng),
            );
            goal.max_amount = Decimal::from(10_000);
            goal
        })
        .collect();

    let layer_of = |i: usize| i * layers / config.policy_count.max(1);
    let mut link = 0usize;
    let mut policies = Vec::with_capacity(config.policy_count);
    for i in 0..config.policy_count {
        let mut policy = NodeDefinition::new(
            format!("policy-{:03}", i),
            format!("Policy {}", i + 1),
            random_leak(&mut rng),
        );
        policy.max_amount = Decimal::from(1_000);

        // Later-layer policies and every goal are valid targets
        let layer = layer_of(i);
        let mut targets: Vec<String> = (i + 1..config.policy_count)
            .filter(|&j| layer_of(j) > layer)
            .map(|j| format!("policy-{:03}", j))
            .collect();
        targets.extend(goals.iter().map(|g| g.id.to_string()));

        let count = config.links_per_policy.min(targets.len());
        for index in sample(&mut rng, targets.len(), count) {
            let weight = Decimal::new(rng.gen_range(min_weight..=max_weight), 2);
            policy = policy.connect(format!("link-{:04}", link), targets[index].clone(), weight);
            link += 1;
        }
        policies.push(policy);
    }

    NetworkDefinition { goals, policies }
}

/// Create `count` players and spread each one's maximum outflow evenly
/// over the policies it starts with.
pub fn seed_players(game: &Game, count: usize) -> Result<Vec<NodeId>, EngineError> {
    let mut players = Vec::with_capacity(count);
    for i in 0..count {
        let id = game.create_player(&format!("Player {}", i + 1))?;
        let owned = game.network().get_funding(&id)?;
        if !owned.is_empty() {
            let share = (game.config().standard_max_player_outflow
                / Decimal::from(owned.len()))
            .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::ToZero);
            let requests: Vec<FundingRequest> = owned
                .into_iter()
                .map(|f| FundingRequest {
                    to_id: f.to_id,
                    amount: share,
                })
                .collect();
            game.network().set_funding(&id, &requests)?;
        }
        players.push(id);
    }
    Ok(players)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::GameConfig;

    #[test]
    fn test_generated_network_imports() {
        let config = GeneratorConfig {
            seed: Some(7),
            ..Default::default()
        };
        let definition = generate_network(&config);
        assert_eq!(definition.policies.len(), 30);
        assert_eq!(definition.goals.len(), 6);

        let game = Game::new(GameConfig::default()).unwrap();
        game.create_network(&definition).unwrap();
        assert_eq!(game.network().links().len(), definition.connections().count());
    }

    #[test]
    fn test_same_seed_same_network() {
        let config = GeneratorConfig {
            seed: Some(11),
            ..Default::default()
        };
        assert_eq!(generate_network(&config), generate_network(&config));
    }

    #[test]
    fn test_weights_within_bounds() {
        let config = GeneratorConfig {
            policy_count: 12,
            min_weight: Decimal::from(5),
            max_weight: Decimal::from(10),
            seed: Some(3),
            ..Default::default()
        };
        for conn in generate_network(&config).connections() {
            assert!(conn.weight >= Decimal::from(5) && conn.weight <= Decimal::from(10));
        }
    }

    #[test]
    fn test_seed_players_stay_within_outflow() {
        let game = Game::new(GameConfig {
            seed: Some(1),
            ..GameConfig::default()
        })
        .unwrap();
        game.create_network(&generate_network(&GeneratorConfig {
            seed: Some(1),
            ..Default::default()
        }))
        .unwrap();

        let players = seed_players(&game, 4).unwrap();
        for player in &players {
            let committed: Decimal = game
                .network()
                .get_funding(player)
                .unwrap()
                .iter()
                .map(|f| f.amount)
                .sum();
            assert!(committed <= game.config().standard_max_player_outflow);
            assert!(committed > Decimal::ZERO);
        }
    }
}
