//! The game facade: configuration, players, tables, the season clock and
//! network setup on top of a [`FundingNetwork`].

pub mod clock;
pub mod config;
pub mod network_def;
pub mod projection;

use crate::core::edge::Edge;
use crate::core::node::{Node, NodeId, NodeKind, PlayerState};
use crate::core::table::{Table, TableId};
use crate::engine::{FundingNetwork, PolicyOffer, TickReport};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use clock::SeasonClock;
use config::{ConfigError, GameConfig};
use log::info;
use network_def::NetworkDefinition;
use parking_lot::{Mutex, RwLock};
use projection::{LeagueEntry, NetworkView, PlayerNetworkView, PlayerView};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub struct Game {
    config: GameConfig,
    network: FundingNetwork,
    clock: Mutex<SeasonClock>,
    tables: RwLock<BTreeMap<TableId, Table>>,
    rng: Mutex<StdRng>,
}

impl Game {
    pub fn new(config: GameConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            network: FundingNetwork::new(),
            clock: Mutex::new(SeasonClock::new()),
            tables: RwLock::new(BTreeMap::new()),
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn network(&self) -> &FundingNetwork {
        &self.network
    }

    // --- Players ---

    /// Create a player with the configured budget and outflow cap, a random
    /// goal, and a handful of random policies owned at rate 0.
    pub fn create_player(&self, name: &str) -> Result<NodeId, EngineError> {
        let budget = self.config.money_per_budget_cycle;
        let mut topology = self.network.topology_mut();

        let goals: Vec<NodeId> = ids_of(&topology.nodes_of_kind(NodeKind::Goal));
        let mut policies: Vec<NodeId> = ids_of(&topology.nodes_of_kind(NodeKind::Policy));
        let goal = {
            let mut rng = self.rng.lock();
            policies.shuffle(&mut *rng);
            goals.choose(&mut *rng).cloned()
        };
        policies.truncate(self.config.policies_per_player);

        let mut state = PlayerState::new(self.config.standard_max_player_outflow, budget);
        state.goal = goal;
        let node = Node::new_player(name, state);
        node.wallet().lock().reset_to(node.id().clone(), budget);
        let id = topology.add_node(node)?;
        for policy in policies {
            topology.add_edge(Edge::new(id.clone(), policy, Decimal::ZERO))?;
        }
        info!("created player {} ({})", name, id);
        Ok(id)
    }

    pub fn players(&self) -> Vec<NodeId> {
        self.network.node_ids(NodeKind::Player)
    }

    pub fn num_players(&self) -> usize {
        self.players().len()
    }

    pub fn player(&self, id: &NodeId) -> Result<PlayerView, EngineError> {
        projection::player_view(&self.network.topology(), id)
    }

    /// The part of the player's goal balance that came from the player.
    pub fn goal_contribution(&self, player: &NodeId) -> Result<Decimal, EngineError> {
        projection::goal_contribution(&self.network.topology(), player)
    }

    pub fn top_players(&self, max: usize) -> Vec<LeagueEntry> {
        projection::league_table(&self.network.topology(), max)
    }

    /// Offer a policy, at the configured default price when none is given.
    pub fn offer_policy(
        &self,
        seller: &NodeId,
        policy: &NodeId,
        price: Option<Decimal>,
    ) -> Result<PolicyOffer, EngineError> {
        let price = price.unwrap_or(self.config.default_offer_price);
        self.network.offer_policy(seller, policy, price)
    }

    pub fn buy_policy(&self, buyer: &NodeId, offer: &PolicyOffer) -> Result<(), EngineError> {
        self.network.buy_policy(buyer, offer)
    }

    // --- Tables ---

    pub fn create_table(&self, name: &str) -> Table {
        let table = Table::new(name);
        self.tables.write().insert(table.id.clone(), table.clone());
        info!("created table {} ({})", table.name, table.id);
        table
    }

    pub fn table(&self, id: &TableId) -> Result<Table, EngineError> {
        self.tables
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::TableNotFound(id.clone()))
    }

    pub fn tables(&self) -> Vec<Table> {
        self.tables.read().values().cloned().collect()
    }

    pub fn join_table(&self, player: &NodeId, table: &TableId) -> Result<(), EngineError> {
        self.table(table)?;
        self.network.set_player_table(player, Some(table.clone()))
    }

    pub fn leave_table(&self, player: &NodeId) -> Result<(), EngineError> {
        self.network.set_player_table(player, None)
    }

    pub fn table_players(&self, table: &TableId) -> Result<Vec<NodeId>, EngineError> {
        self.table(table)?;
        let topology = self.network.topology();
        Ok(topology
            .nodes_of_kind(NodeKind::Player)
            .into_iter()
            .filter(|n| n.player().and_then(|p| p.table.as_ref()) == Some(table))
            .map(|n| n.id().clone())
            .collect())
    }

    // --- Projections ---

    pub fn get_network(&self, players: Option<&[NodeId]>) -> Result<NetworkView, EngineError> {
        projection::network_view(&self.network.topology(), players)
    }

    pub fn get_network_for_player(&self, player: &NodeId) -> Result<PlayerNetworkView, EngineError> {
        projection::player_network_view(&self.network.topology(), player)
    }

    pub fn get_network_for_table(&self, table: &TableId) -> Result<NetworkView, EngineError> {
        let players = self.table_players(table)?;
        self.get_network(Some(&players))
    }

    // --- Network setup ---

    pub fn create_network(&self, definition: &NetworkDefinition) -> Result<(), EngineError> {
        network_def::import(&mut self.network.topology_mut(), definition)?;
        info!(
            "imported {} goals and {} policies",
            definition.goals.len(),
            definition.policies.len()
        );
        Ok(())
    }

    pub fn update_network(&self, definition: &NetworkDefinition) -> Result<(), EngineError> {
        network_def::update(&mut self.network.topology_mut(), definition)
    }

    pub fn export_network(&self) -> NetworkDefinition {
        network_def::export(&self.network.topology())
    }

    pub fn clear_network(&self) -> Result<(), EngineError> {
        network_def::clear_network(&mut self.network.topology_mut())?;
        info!("cleared network");
        Ok(())
    }

    pub fn clear_players(&self) -> Result<(), EngineError> {
        network_def::clear_players(&mut self.network.topology_mut())?;
        info!("cleared players");
        Ok(())
    }

    // --- Simulation ---

    pub fn tick(&self) -> Result<TickReport, EngineError> {
        self.network.tick()
    }

    pub fn do_replenish_budget(&self) -> Result<usize, EngineError> {
        self.network.do_replenish_budget()
    }

    // --- Season clock ---

    pub fn start_game(&self, year: i32) -> i32 {
        self.start_game_at(year, Utc::now())
    }

    pub fn start_game_at(&self, year: i32, now: DateTime<Utc>) -> i32 {
        info!("starting game year {}", year);
        self.clock.lock().start_at(year, now, self.config.year_length())
    }

    pub fn stop_game(&self) -> Option<i32> {
        self.clock.lock().stop()
    }

    pub fn advance_year(&self) -> Option<i32> {
        self.advance_year_at(Utc::now())
    }

    pub fn advance_year_at(&self, now: DateTime<Utc>) -> Option<i32> {
        self.clock.lock().advance_at(now, self.config.year_length())
    }

    pub fn current_year(&self) -> Option<i32> {
        self.clock.lock().current_year()
    }

    pub fn is_running(&self) -> bool {
        self.clock.lock().is_running()
    }

    pub fn is_passed_year_end(&self, now: DateTime<Utc>) -> bool {
        self.clock.lock().is_passed_year_end(now)
    }
}

fn ids_of(nodes: &[&Node]) -> Vec<NodeId> {
    nodes.iter().map(|n| n.id().clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use network_def::NodeDefinition;
    use rust_decimal_macros::dec;

    fn seeded() -> Game {
        Game::new(GameConfig {
            seed: Some(42),
            ..GameConfig::default()
        })
        .unwrap()
    }

    fn small_network() -> NetworkDefinition {
        NetworkDefinition {
            goals: vec![
                NodeDefinition::new("g1", "World Peace", dec!(0.1)),
                NodeDefinition::new("g2", "Clean Air", dec!(0.1)),
            ],
            policies: (1..=7)
                .map(|i| {
                    NodeDefinition::new(format!("p{}", i), format!("Policy {}", i), dec!(0.1))
                        .connect(format!("l{}", i), if i % 2 == 0 { "g1" } else { "g2" }, dec!(1))
                })
                .collect(),
        }
    }

    #[test]
    fn test_create_player_defaults() {
        let game = seeded();
        game.create_network(&small_network()).unwrap();
        let id = game.create_player("Matt").unwrap();

        let player = game.player(&id).unwrap();
        assert_eq!(player.balance, dec!(1500000));
        assert_eq!(player.max_outflow, dec!(1000));
        assert!(player.goal.is_some());
        assert_eq!(player.policies.len(), 5);
        assert!(game
            .network()
            .get_funding(&id)
            .unwrap()
            .iter()
            .all(|f| f.amount == Decimal::ZERO));
    }

    #[test]
    fn test_create_player_on_empty_network() {
        let game = seeded();
        let id = game.create_player("Matt").unwrap();
        let player = game.player(&id).unwrap();
        assert!(player.goal.is_none());
        assert!(player.policies.is_empty());
        assert_eq!(game.num_players(), 1);
    }

    #[test]
    fn test_tables() {
        let game = seeded();
        let table = game.create_table("Table 1");
        let matt = game.create_player("Matt").unwrap();
        let simon = game.create_player("Simon").unwrap();
        game.join_table(&matt, &table.id).unwrap();

        assert_eq!(game.table_players(&table.id).unwrap(), vec![matt.clone()]);
        assert_eq!(game.tables().len(), 1);
        assert!(game.join_table(&simon, &TableId::new("missing")).is_err());

        game.leave_table(&matt).unwrap();
        assert!(game.table_players(&table.id).unwrap().is_empty());
    }

    #[test]
    fn test_offer_uses_default_price() {
        let game = seeded();
        game.create_network(&small_network()).unwrap();
        let matt = game.create_player("Matt").unwrap();
        let policy = game.player(&matt).unwrap().policies[0].id.clone();

        let offer = game.offer_policy(&matt, &policy, None).unwrap();
        assert_eq!(offer.price, dec!(20000));
    }

    #[test]
    fn test_season_clock() {
        let game = seeded();
        assert!(!game.is_running());
        let now = Utc::now();
        game.start_game_at(2030, now);
        assert!(game.is_running());
        assert_eq!(game.current_year(), Some(2030));
        assert!(game.is_passed_year_end(now + chrono::Duration::hours(3)));

        assert_eq!(game.advance_year_at(now), Some(2031));
        assert_eq!(game.stop_game(), Some(2031));
        assert!(!game.is_running());
    }

    #[test]
    fn test_same_seed_same_setup() {
        let a = seeded();
        let b = seeded();
        a.create_network(&small_network()).unwrap();
        b.create_network(&small_network()).unwrap();
        let pa = a.create_player("Matt").unwrap();
        let pb = b.create_player("Matt").unwrap();

        let names = |game: &Game, id: &NodeId| -> Vec<String> {
            game.player(id).unwrap().policies.into_iter().map(|p| p.name).collect()
        };
        assert_eq!(names(&a, &pa), names(&b, &pb));
        assert_eq!(
            a.player(&pa).unwrap().goal.map(|g| g.id),
            b.player(&pb).unwrap().goal.map(|g| g.id)
        );
    }
}
