//! Mutual-Exclusion Engine Tests
//!
//! ## Test Scopes
//! - **Types**: Algorithm name resolution and the arithmetic applied in the critical section.
//! - **Ricart-Agrawala state machine**: Tie-breaking, deferral and quorum completeness.
//! - **Token Ring hand-off**: The token follows the address order and never duplicates.
//! - **Live exclusion**: Sampled across a running cluster, at most one node is inside.
//! - **Engine lifecycle**: Start/Done on a solitary node and protocol misuse rejection.

#[cfg(test)]
mod tests {
    use crate::clock::lamport::Timestamp;
    use crate::config::NodeConfig;
    use crate::error::ClusterError;
    use crate::membership::types::Address;
    use crate::mutex::engine::{Engine, Strategy};
    use crate::mutex::ricart_agrawala::{RequestDecision, RicartAgrawala};
    use crate::mutex::types::{
        Algorithm, CalculationState, Grant, MathOp, OPERAND_RANGE, random_start_value,
    };
    use crate::rpc::local::LocalNetwork;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::time::Duration;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn requesting() -> CalculationState {
        CalculationState {
            needs_critical_section: true,
            ..CalculationState::default()
        }
    }

    // ============================================================
    // TYPE TESTS
    // ============================================================

    #[test]
    fn test_algorithm_from_name() {
        assert_eq!(Algorithm::from_name("tr"), Algorithm::TokenRing);
        assert_eq!(Algorithm::from_name("RA"), Algorithm::RicartAgrawala);
        assert_eq!(Algorithm::from_name("ricart_agrawala"), Algorithm::RicartAgrawala);
        assert_eq!(Algorithm::from_name(" token_ring "), Algorithm::TokenRing);
    }

    #[test]
    fn test_unknown_algorithm_falls_back_to_token_ring() {
        assert_eq!(Algorithm::from_name("paxos"), Algorithm::TokenRing);
        assert_eq!(Algorithm::from_name(""), Algorithm::TokenRing);
    }

    #[test]
    fn test_algorithm_wire_name_round_trips() {
        for algorithm in [Algorithm::TokenRing, Algorithm::RicartAgrawala] {
            assert_eq!(Algorithm::from_name(algorithm.name()), algorithm);
        }
    }

    #[test]
    fn test_math_op_apply() {
        assert_eq!(MathOp::Add.apply(10, 5), 15);
        assert_eq!(MathOp::Sub.apply(10, 15), -5);
        assert_eq!(MathOp::Mul.apply(-3, 7), -21);
        assert_eq!(MathOp::Div.apply(10, 3), 3);
        assert_eq!(MathOp::Div.apply(-7, 2), -3);
    }

    #[test]
    fn test_math_op_never_panics() {
        assert_eq!(MathOp::Add.apply(i64::MAX, 1), i64::MIN);
        assert_eq!(MathOp::Mul.apply(i64::MAX, 2), -2);
        assert_eq!(MathOp::Div.apply(42, 0), 42);
    }

    #[test]
    fn test_generated_operands_are_non_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();

        for _ in 0..1000 {
            let (op, operand) = MathOp::generate(&mut rng);
            assert!(OPERAND_RANGE.contains(&operand));
            assert_ne!(operand, 0);
            seen.insert(op);
        }
        assert_eq!(seen.len(), 4, "every operation should be drawn");
    }

    #[test]
    fn test_random_start_value_in_operand_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            assert!(OPERAND_RANGE.contains(&random_start_value(&mut rng)));
        }
    }

    // ============================================================
    // RICART-AGRAWALA STATE MACHINE TESTS
    // ============================================================

    #[test]
    fn test_begin_request_stamps_and_clears_tracker() {
        let members = [addr("10.0.0.1"), addr("10.0.0.2")];
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));

        let first = ra.begin_request();
        ra.record_reply(addr("10.0.0.1"), &members);
        let second = ra.begin_request();

        assert!(second > first);
        assert!(ra.replies.is_empty());
        assert!(!ra.quorum_reached());
        assert_eq!(ra.request_stamp, Some(second));
    }

    #[test]
    fn test_quorum_requires_every_member() {
        let members = [addr("10.0.0.1"), addr("10.0.0.2"), addr("10.0.0.3")];
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        ra.begin_request();

        assert!(!ra.record_reply(addr("10.0.0.1"), &members));
        assert!(!ra.record_reply(addr("10.0.0.3"), &members));
        assert!(!ra.quorum_reached());

        assert!(ra.record_reply(addr("10.0.0.2"), &members));
        assert!(ra.quorum_reached());

        // A duplicate OK does not signal again
        assert!(!ra.record_reply(addr("10.0.0.2"), &members));
    }

    #[test]
    fn test_quorum_is_equality_not_count() {
        let members = [addr("10.0.0.1"), addr("10.0.0.2")];
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        ra.begin_request();

        // Two replies, but one is from a stranger
        ra.record_reply(addr("10.0.0.1"), &members);
        assert!(!ra.record_reply(addr("10.0.0.9"), &members));
        assert!(!ra.quorum_reached());
    }

    #[test]
    fn test_member_joining_mid_round_blocks_quorum() {
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        ra.begin_request();
        ra.record_reply(addr("10.0.0.1"), &[addr("10.0.0.1"), addr("10.0.0.2")]);

        let grown = [addr("10.0.0.1"), addr("10.0.0.2"), addr("10.0.0.3")];
        assert!(!ra.record_reply(addr("10.0.0.2"), &grown));
    }

    #[test]
    fn test_reply_without_request_is_ignored() {
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        assert!(!ra.record_reply(addr("10.0.0.1"), &[addr("10.0.0.1")]));
        assert!(ra.replies.is_empty());
    }

    #[test]
    fn test_forget_departed_member_completes_quorum() {
        let members = [addr("10.0.0.1"), addr("10.0.0.2"), addr("10.0.0.3")];
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        ra.begin_request();
        ra.record_reply(addr("10.0.0.1"), &members);
        ra.record_reply(addr("10.0.0.2"), &members);

        let remaining = [addr("10.0.0.1"), addr("10.0.0.2")];
        assert!(ra.forget(&addr("10.0.0.3"), &remaining));
        assert!(ra.quorum_reached());
    }

    #[test]
    fn test_late_reply_from_departed_member_is_dropped() {
        let members = [addr("10.0.0.1"), addr("10.0.0.2"), addr("10.0.0.3")];
        let remaining = [addr("10.0.0.1"), addr("10.0.0.2")];
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        ra.begin_request();
        ra.record_reply(addr("10.0.0.1"), &members);

        // .3 signs off, then its OK shows up afterwards
        assert!(!ra.forget(&addr("10.0.0.3"), &remaining));
        assert!(!ra.record_reply(addr("10.0.0.3"), &remaining));
        assert!(!ra.replies.contains(&addr("10.0.0.3")));

        assert!(ra.record_reply(addr("10.0.0.2"), &remaining));
        assert!(ra.quorum_reached());
    }

    #[test]
    fn test_idle_node_replies_immediately() {
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        let decision =
            ra.receive_request(&CalculationState::default(), Timestamp::new(3, addr("10.0.0.2")));

        assert_eq!(decision, RequestDecision::ReplyNow);
        assert!(ra.deferred.is_empty());
        assert_eq!(ra.clock.now().counter, 4);
    }

    #[test]
    fn test_node_in_critical_section_defers() {
        let mut ra = RicartAgrawala::new(addr("10.0.0.9"));
        ra.begin_request();
        let calc = CalculationState {
            needs_critical_section: true,
            in_critical_section: true,
            ..CalculationState::default()
        };

        // Even an older request waits while we are inside
        let decision = ra.receive_request(&calc, Timestamp::new(0, addr("10.0.0.1")));
        assert_eq!(decision, RequestDecision::Defer);
        assert_eq!(ra.deferred.front(), Some(&addr("10.0.0.1")));
    }

    #[test]
    fn test_equal_counters_lower_address_wins() {
        let low = addr("10.0.0.2");
        let high = addr("10.0.0.5");

        let mut at_low = RicartAgrawala::new(low);
        at_low.request_stamp = Some(Timestamp::new(5, low));
        let mut at_high = RicartAgrawala::new(high);
        at_high.request_stamp = Some(Timestamp::new(5, high));

        // 10.0.0.2 queues 10.0.0.5's request
        let decision = at_low.receive_request(&requesting(), Timestamp::new(5, high));
        assert_eq!(decision, RequestDecision::Defer);

        // 10.0.0.5 lets 10.0.0.2 through
        let decision = at_high.receive_request(&requesting(), Timestamp::new(5, low));
        assert_eq!(decision, RequestDecision::ReplyNow);

        // Released only when 10.0.0.2 finishes
        assert_eq!(at_low.finish_request(), vec![high]);
    }

    #[test]
    fn test_both_sides_never_grant_each_other() {
        let a = addr("10.0.0.3");
        let b = addr("10.0.0.4");

        for (ca, cb) in [(1u64, 1u64), (1, 2), (2, 1), (7, 7), (9, 3)] {
            let mut at_a = RicartAgrawala::new(a);
            at_a.request_stamp = Some(Timestamp::new(ca, a));
            let mut at_b = RicartAgrawala::new(b);
            at_b.request_stamp = Some(Timestamp::new(cb, b));

            let a_grants_b = at_a.receive_request(&requesting(), Timestamp::new(cb, b));
            let b_grants_a = at_b.receive_request(&requesting(), Timestamp::new(ca, a));

            assert_ne!(
                a_grants_b == RequestDecision::ReplyNow,
                b_grants_a == RequestDecision::ReplyNow,
                "exactly one side must grant for stamps ({}, {})",
                ca,
                cb
            );
        }
    }

    #[test]
    fn test_finish_request_drains_in_arrival_order() {
        let mut ra = RicartAgrawala::new(addr("10.0.0.1"));
        ra.begin_request();
        for last in [7u8, 3, 5] {
            ra.receive_request(&requesting(), Timestamp::new(100, Address::new(10, 0, 0, last)));
        }

        let drained = ra.finish_request();
        assert_eq!(drained, vec![addr("10.0.0.7"), addr("10.0.0.3"), addr("10.0.0.5")]);
        assert!(ra.deferred.is_empty());
        assert_eq!(ra.request_stamp, None);
    }

    // ============================================================
    // TOKEN RING HAND-OFF TESTS
    // ============================================================

    #[tokio::test]
    async fn test_token_follows_address_order() {
        let network = LocalNetwork::new();
        let config = NodeConfig::fast(Duration::from_millis(100));
        let nodes: Vec<_> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|a| network.spawn_node(addr(a), config.clone()))
            .collect();
        nodes[1].join(nodes[0].address).await.unwrap();
        nodes[2].join(nodes[0].address).await.unwrap();

        nodes[0].engine().await.seed_token().await;

        // .1 -> .2 -> .3 -> .1
        for step in 0..6 {
            let holder = step % nodes.len();
            let mut holders = Vec::new();
            for node in &nodes {
                if node.status().await.has_token {
                    holders.push(node.address);
                }
            }
            assert_eq!(holders, vec![nodes[holder].address], "step {}", step);

            nodes[holder].engine().await.release().await;
        }
    }

    #[tokio::test]
    async fn test_solitary_node_keeps_token_on_release() {
        let network = LocalNetwork::new();
        let node = network.spawn_node(addr("10.0.0.1"), NodeConfig::fast(Duration::from_millis(50)));
        let engine = node.engine().await;

        engine.seed_token().await;
        engine.release().await;

        assert!(engine.snapshot().await.has_token);
    }

    #[tokio::test]
    async fn test_token_kept_when_successor_unreachable() {
        let network = LocalNetwork::new();
        let config = NodeConfig::fast(Duration::from_millis(50));
        let a = network.spawn_node(addr("10.0.0.1"), config.clone());
        let b = network.spawn_node(addr("10.0.0.2"), config);
        b.join(a.address).await.unwrap();

        network.set_reachable(b.address, false);
        let engine = a.engine().await;
        engine.seed_token().await;
        engine.release().await;

        assert!(engine.snapshot().await.has_token);
        assert!(!b.status().await.has_token);
    }

    #[tokio::test]
    async fn test_token_held_idle_when_not_waiting() {
        let network = LocalNetwork::new();
        let node = network.spawn_node(addr("10.0.0.1"), NodeConfig::fast(Duration::from_millis(50)));
        let engine = node.engine().await;

        engine.acquire(Grant::Token).await.unwrap();

        let snapshot = engine.snapshot().await;
        assert!(snapshot.has_token);
        assert!(!snapshot.in_critical_section);
    }

    // ============================================================
    // LIVE EXCLUSION TESTS
    // ============================================================

    /// Locks every engine before reading, so the counts describe one instant.
    /// Engines never wait on another engine's lock while holding their own.
    async fn sample(engines: &[Arc<Engine>]) -> (usize, usize) {
        let mut states = Vec::with_capacity(engines.len());
        for engine in engines {
            states.push(engine.state.lock().await);
        }

        let inside = states
            .iter()
            .filter(|state| state.calc.in_critical_section)
            .count();
        let tokens = states
            .iter()
            .filter(|state| matches!(&state.strategy, Strategy::TokenRing(ring) if ring.has_token))
            .count();
        (inside, tokens)
    }

    async fn run_and_sample(algorithm: &str) -> usize {
        let network = LocalNetwork::new();
        let config = NodeConfig::fast(Duration::from_millis(300));
        let nodes: Vec<_> = (1..=4u8)
            .map(|i| network.spawn_node(Address::new(10, 0, 0, i), config.clone()))
            .collect();
        for node in &nodes[1..] {
            node.join(nodes[0].address).await.unwrap();
        }

        nodes[0].start_calculation(10, algorithm).await.unwrap();

        let mut engines = Vec::new();
        for node in &nodes {
            engines.push(node.engine().await);
        }

        let mut samples = 0;
        loop {
            let (inside, tokens) = sample(&engines).await;
            assert!(inside <= 1, "{} nodes inside the critical section", inside);
            assert!(tokens <= 1, "{} tokens in the ring", tokens);
            samples += 1;

            let mut running = false;
            for engine in &engines {
                running |= engine.is_running().await;
            }
            if !running {
                break;
            }
            tokio::time::sleep(Duration::from_micros(200)).await;
        }

        for node in &nodes {
            node.wait_for_calculation().await;
        }
        samples
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_token_ring_exclusive_while_running() {
        assert!(run_and_sample("tr").await > 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ricart_agrawala_exclusive_while_running() {
        assert!(run_and_sample("ra").await > 1);
    }

    // ============================================================
    // ENGINE LIFECYCLE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_solitary_token_ring_runs_to_done() {
        let network = LocalNetwork::new();
        let node = network.spawn_node(addr("10.0.0.1"), NodeConfig::fast(Duration::from_millis(150)));
        let engine = node.engine().await;
        engine.seed_token().await;

        let handle = engine.start(10).await.expect("engine should start");
        assert!(engine.is_running().await);

        let final_value = handle.await.unwrap();

        let snapshot = engine.snapshot().await;
        assert!(!snapshot.running);
        assert!(!snapshot.has_token, "Done discards the token");
        assert_eq!(snapshot.current_value, final_value);
    }

    #[tokio::test]
    async fn test_solitary_ricart_agrawala_runs_to_done() {
        let network = LocalNetwork::new();
        let node = network.spawn_node(addr("10.0.0.1"), NodeConfig::fast(Duration::from_millis(150)));
        node.select_algorithm("ra").await;
        let engine = node.engine().await;

        let handle = engine.start(10).await.expect("engine should start");
        let final_value = handle.await.unwrap();

        assert_eq!(engine.current_value().await, final_value);
        assert!(!engine.is_running().await);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let network = LocalNetwork::new();
        let node = network.spawn_node(addr("10.0.0.1"), NodeConfig::fast(Duration::from_millis(100)));
        let engine = node.engine().await;
        engine.seed_token().await;

        let handle = engine.start(1).await.unwrap();
        assert!(engine.start(2).await.is_none());
        handle.await.unwrap();

        // A finished engine can be started again
        let handle = engine.start(3).await.expect("restart after done");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_applies_operation() {
        let network = LocalNetwork::new();
        let node = network.spawn_node(addr("10.0.0.1"), NodeConfig::default());
        let engine = node.engine().await;

        assert_eq!(engine.update(MathOp::Add, 7).await, 7);
        assert_eq!(engine.update(MathOp::Mul, 3).await, 21);
        assert_eq!(engine.update(MathOp::Div, 4).await, 5);
        assert_eq!(engine.current_value().await, 5);
    }

    #[tokio::test]
    async fn test_protocol_misuse_is_rejected() {
        let network = LocalNetwork::new();
        let node = network.spawn_node(addr("10.0.0.1"), NodeConfig::default());

        let tr = node.engine().await;
        let err = tr
            .receive_request(Timestamp::new(1, addr("10.0.0.2")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClusterError::ProtocolMisuse {
                method: "request_token",
                ..
            }
        ));
        assert!(tr.acquire(Grant::Reply(addr("10.0.0.2"))).await.is_err());

        node.select_algorithm("ra").await;
        let ra = node.engine().await;
        let err = ra.acquire(Grant::Token).await.unwrap_err();
        assert!(matches!(
            err,
            ClusterError::ProtocolMisuse {
                method: "take_token",
                ..
            }
        ));
    }
}
