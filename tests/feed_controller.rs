mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{test_db, user, FlakyBackend, NewPost, TestDb};
use squadfeed::backend::{ContentBackend, DynContentBackend};
use squadfeed::db::models::PostId;
use squadfeed::error::FeedError;
use squadfeed::feed::{FeedController, FeedPlanner, FeedSession, SortMode};

fn controller(
    db: &TestDb,
    page_size: u32,
) -> (FeedController<dyn ContentBackend>, Arc<FlakyBackend>) {
    let flaky = Arc::new(FlakyBackend::new(db.pool.clone()));
    let backend: DynContentBackend = flaky.clone();
    let planner = Arc::new(FeedPlanner::new(backend, 50));
    let session = FeedSession::new(SortMode::New, None, page_size);
    (FeedController::new(planner, session, Some(user("bob"))), flaky)
}

/// Posts where `new` and `top` disagree on order.
fn seed(db: &TestDb) -> (PostId, PostId, PostId) {
    let popular = db.add_post(NewPost::new("popular", 0).votes(20, 0));
    let middle = db.add_post(NewPost::new("middle", 1).votes(10, 0));
    let fresh = db.add_post(NewPost::new("fresh", 2).votes(1, 0));
    (popular, middle, fresh)
}

async fn post_ids(controller: &FeedController<dyn ContentBackend>) -> Vec<PostId> {
    controller.posts().await.iter().map(|p| p.id).collect()
}

#[tokio::test]
async fn load_more_appends_until_short_page() {
    let db = test_db();
    let (popular, middle, fresh) = seed(&db);
    let (controller, flaky) = controller(&db, 2);

    let first = controller.refresh().await.unwrap().unwrap();
    assert!(first.has_more);
    assert_eq!(post_ids(&controller).await, vec![fresh, middle]);

    let second = controller.load_more().await.unwrap().unwrap();
    assert_eq!(second.page, 2);
    assert_eq!(second.total, 3);
    assert!(!second.has_more);
    assert_eq!(post_ids(&controller).await, vec![fresh, middle, popular]);

    // Nothing more to load, so no query is issued
    let calls = flaky.query_calls.load(Ordering::SeqCst);
    assert_eq!(controller.load_more().await.unwrap(), None);
    assert_eq!(flaky.query_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn sort_change_clears_before_new_page_lands() {
    let db = test_db();
    let (popular, middle, fresh) = seed(&db);
    let (controller, flaky) = controller(&db, 10);

    controller.refresh().await.unwrap();
    assert_eq!(post_ids(&controller).await.len(), 3);

    flaky.delay_queries([Duration::from_millis(150)]);
    let pending = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.set_sort(SortMode::Top).await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(controller.posts().await.is_empty());

    pending.await.unwrap().unwrap();
    assert_eq!(post_ids(&controller).await, vec![popular, middle, fresh]);
}

#[tokio::test]
async fn slow_stale_response_is_dropped() {
    let db = test_db();
    let (popular, middle, fresh) = seed(&db);
    let (controller, flaky) = controller(&db, 10);

    // The `top` fetch is issued first but answers last
    flaky.delay_queries([Duration::from_millis(150)]);
    let (slow, fast) = tokio::join!(
        controller.set_sort(SortMode::Top),
        controller.set_sort(SortMode::New),
    );

    assert_eq!(slow.unwrap(), None);
    assert!(fast.unwrap().is_some());
    assert_eq!(post_ids(&controller).await, vec![fresh, middle, popular]);
    assert_eq!(controller.session().lock().await.sort(), SortMode::New);
}

#[tokio::test]
async fn failed_refresh_keeps_displayed_posts() {
    let db = test_db();
    seed(&db);
    let (controller, flaky) = controller(&db, 10);

    controller.refresh().await.unwrap();
    let before = post_ids(&controller).await;

    flaky.fail_queries.store(true, Ordering::SeqCst);
    let err = controller.refresh().await.unwrap_err();
    assert!(matches!(err, FeedError::TransientFetch { retryable: true, .. }));
    assert!(err.is_retryable());
    assert_eq!(post_ids(&controller).await, before);

    flaky.fail_queries.store(false, Ordering::SeqCst);
    controller.refresh().await.unwrap();
    assert_eq!(post_ids(&controller).await, before);
}

#[tokio::test]
async fn scope_change_restarts_at_first_page() {
    let db = test_db();
    let squad = db.add_squad(1, "rust");
    let scoped = db.add_post(NewPost::new("scoped", 0).in_squad(squad));
    db.add_post(NewPost::new("loose", 1));
    let (controller, _flaky) = controller(&db, 10);

    controller.refresh().await.unwrap();
    assert_eq!(post_ids(&controller).await.len(), 2);

    let applied = controller.set_scope(Some(squad)).await.unwrap().unwrap();
    assert_eq!(applied.page, 1);
    assert_eq!(post_ids(&controller).await, vec![scoped]);
}

#[tokio::test]
async fn load_more_keeps_the_first_page_filters() {
    let db = test_db();
    let rust = db.add_squad(1, "rust");
    let go = db.add_squad(2, "go");
    db.join(rust, "bob");
    let rust_old = db.add_post(NewPost::new("rust old", 0).in_squad(rust));
    let rust_new = db.add_post(NewPost::new("rust new", 1).in_squad(rust));
    db.add_post(NewPost::new("go", 2).in_squad(go));
    let (controller, _flaky) = controller(&db, 1);

    controller.set_sort(SortMode::Following).await.unwrap();
    assert_eq!(post_ids(&controller).await, vec![rust_new]);

    // Joining another squad mid-scroll must not reshuffle the pages
    db.join(go, "bob");
    controller.load_more().await.unwrap();
    assert_eq!(post_ids(&controller).await, vec![rust_new, rust_old]);

    // A refresh picks the new membership up
    controller.refresh().await.unwrap();
    assert_eq!(post_ids(&controller).await.len(), 1);
    assert_ne!(post_ids(&controller).await, vec![rust_new]);
}
