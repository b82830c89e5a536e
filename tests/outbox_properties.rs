//! Property tests for outbox atomicity, ordering, and exactly-once effects.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use points_outbox::adapters::events::{BackoffPolicy, Forwarder, ForwarderConfig, InMemoryEventBus};
use points_outbox::adapters::memory::{FailPoint, InMemoryDiscountRepository, InMemoryStore};
use points_outbox::application::handlers::{
    ApplyDiscountHandler, UsePointsAsDiscount, UsePointsAsDiscountHandler,
};
use points_outbox::application::{AggregateTransaction, CommandHandler};
use points_outbox::domain::foundation::UserId;
use points_outbox::domain::user::{User, POINTS_USED_FOR_DISCOUNT};
use points_outbox::ports::{DiscountRepository, EventSubscriber};

const INITIAL_POINTS: i64 = 500;

#[derive(Debug, Clone)]
enum Step {
    /// Spend `points` of user `user`; may be rejected by the aggregate.
    Use { user: i64, points: i64 },
    /// Same, with a storage fault injected at `fault`.
    Faulty { user: i64, points: i64, fault: FailPoint },
    /// Forward one batch, optionally crashing before the cursor write.
    Forward { crash: bool },
}

fn fault() -> impl Strategy<Value = FailPoint> {
    prop_oneof![
        Just(FailPoint::Begin),
        Just(FailPoint::LockUser),
        Just(FailPoint::SaveUser),
        Just(FailPoint::AppendOutbox),
        Just(FailPoint::Commit),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (1i64..=3, -10i64..=200).prop_map(|(user, points)| Step::Use { user, points }),
        1 => (1i64..=3, 1i64..=50, fault())
            .prop_map(|(user, points, fault)| Step::Faulty { user, points, fault }),
        2 => any::<bool>().prop_map(|crash| Step::Forward { crash }),
    ]
}

struct Harness {
    store: InMemoryStore,
    bus: Arc<InMemoryEventBus>,
    discounts: Arc<InMemoryDiscountRepository>,
    handler: UsePointsAsDiscountHandler,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        for id in 1..=3 {
            store.insert_user(User::unmarshal(
                UserId::from_raw(id),
                format!("u{}@example.com", id),
                INITIAL_POINTS,
            ));
        }

        let bus = Arc::new(InMemoryEventBus::new());
        let discounts = Arc::new(InMemoryDiscountRepository::new());
        bus.subscribe(
            POINTS_USED_FOR_DISCOUNT,
            Arc::new(ApplyDiscountHandler::new(discounts.clone())),
        );

        let transaction = Arc::new(AggregateTransaction::new(Arc::new(store.clone())));
        Self {
            store,
            bus,
            discounts,
            handler: UsePointsAsDiscountHandler::new(transaction),
        }
    }

    /// A new forwarder per call, as after a process restart.
    fn forwarder(&self) -> Forwarder {
        Forwarder::with_config(
            Arc::new(self.store.clone()),
            self.bus.clone(),
            ForwarderConfig::default()
                .with_batch_size(4)
                .with_backoff(BackoffPolicy::fixed(Duration::from_millis(1))),
        )
    }

    fn points(&self, user: i64) -> i64 {
        self.store
            .user(UserId::from_raw(user))
            .map(|u| u.points())
            .unwrap_or_default()
    }

    async fn discount(&self, user: i64) -> i64 {
        self.discounts
            .find(UserId::from_raw(user))
            .await
            .unwrap()
            .map(|d| d.next_order_discount())
            .unwrap_or(0)
    }

    async fn use_points(&self, user: i64, points: i64) -> bool {
        self.handler
            .execute(UsePointsAsDiscount {
                user_id: UserId::from_raw(user),
                points,
            })
            .await
            .is_ok()
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Points spent, outbox contents, and discounts granted always agree once
    /// the outbox is drained, whatever faults and crashes happened on the way.
    #[test]
    fn drained_outbox_converges(steps in prop::collection::vec(step(), 1..40)) {
        block_on(async {
            let harness = Harness::new();
            let mut expected_entries = 0usize;

            for step in steps {
                match step {
                    Step::Use { user, points } => {
                        let before = harness.points(user);
                        let accepted = harness.use_points(user, points).await;

                        prop_assert_eq!(accepted, points > 0 && points <= before);
                        if accepted {
                            expected_entries += 1;
                            prop_assert_eq!(harness.points(user), before - points);
                        } else {
                            prop_assert_eq!(harness.points(user), before);
                        }
                    }
                    Step::Faulty { user, points, fault } => {
                        let before = harness.points(user);
                        let outbox_before = harness.store.outbox_len();

                        harness.store.fail_next(fault);
                        let accepted = harness.use_points(user, points).await;
                        harness.store.heal();

                        // Neither write survives a failed transaction
                        prop_assert!(!accepted);
                        prop_assert_eq!(harness.points(user), before);
                        prop_assert_eq!(harness.store.outbox_len(), outbox_before);
                    }
                    Step::Forward { crash } => {
                        if crash {
                            harness.store.fail_next(FailPoint::StoreCursor);
                        }
                        let _ = harness.forwarder().forward_batch().await;
                        harness.store.heal();
                    }
                }

                for user in 1..=3 {
                    prop_assert!(harness.points(user) >= 0);
                }
                prop_assert!(harness.store.locked_users().is_empty());
            }

            prop_assert_eq!(harness.store.outbox_len(), expected_entries);

            let forwarder = harness.forwarder();
            while forwarder.forward_batch().await.map_err(|e| TestCaseError::fail(e.to_string()))? > 0 {}

            for user in 1..=3 {
                let spent = INITIAL_POINTS - harness.points(user);
                prop_assert_eq!(harness.discount(user).await, spent);
            }
            prop_assert_eq!(harness.discounts.applied_count(), expected_entries);
            Ok(())
        })?;
    }

    /// Sequence ids grow with commit order and the forwarder publishes them
    /// in that order, with crash duplicates only re-sending a suffix.
    #[test]
    fn publish_order_follows_sequence_order(
        amounts in prop::collection::vec((1i64..=3, 1i64..=20), 1..30),
        crashes in prop::collection::vec(any::<bool>(), 1..10),
    ) {
        block_on(async {
            let harness = Harness::new();

            for (user, points) in &amounts {
                harness.use_points(*user, *points).await;
            }

            for crash in crashes {
                if crash {
                    harness.store.fail_next(FailPoint::StoreCursor);
                }
                let _ = harness.forwarder().forward_batch().await;
                harness.store.heal();
            }
            let forwarder = harness.forwarder();
            while forwarder.forward_batch().await.map_err(|e| TestCaseError::fail(e.to_string()))? > 0 {}

            let entries = harness.store.outbox_entries();
            prop_assert!(entries.windows(2).all(|w| w[0].sequence_id < w[1].sequence_id));

            let order: Vec<_> = entries
                .iter()
                .map(|e| e.decode().map(|env| env.event_id))
                .collect::<Result<_, _>>()
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            // Dropping immediate repeats leaves exactly the outbox order
            let mut published: Vec<_> = harness
                .bus
                .published_events()
                .into_iter()
                .map(|e| e.event_id)
                .collect();
            published.dedup();
            prop_assert_eq!(published, order);
            Ok(())
        })?;
    }
}
