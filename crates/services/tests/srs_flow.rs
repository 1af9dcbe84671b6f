use chrono::Duration;
use srs_core::model::{Quality, UserId, Word, WordId};
use srs_core::time::{fixed_now, start_of_day};
use services::{Clock, SrsEngine, SrsServiceError};
use storage::repository::{InMemoryRepository, Storage, StorageError};
use storage::sqlite::SqliteRepository;

const USER: UserId = UserId::new(42);

async fn register(engine: &SrsEngine, id: u64, hanzi: &str, hsk: u8) -> WordId {
    let word_id = WordId::new(id);
    let word = Word::new(word_id, hanzi, "", hsk).unwrap();
    engine.reviews().register_word(&word).await.unwrap();
    word_id
}

#[tokio::test]
async fn word_moves_through_review_cycle_over_days() {
    let storage = Storage::from_backend(InMemoryRepository::new());
    let start = fixed_now();
    let day0 = SrsEngine::new(&storage, Clock::fixed(start));

    let word = register(&day0, 1, "你好", 1).await;
    let other = register(&day0, 2, "谢谢", 1).await;
    day0.reviews().initialize_word_progress(USER, word).await.unwrap();
    day0.reviews().initialize_word_progress(USER, other).await.unwrap();

    // New words are never in the review queue.
    assert!(day0.queue().get_srs_batch(USER, None, None).await.unwrap().is_empty());

    let first = day0.reviews().update_srs_by_word(USER, word, 5, 3).await.unwrap();
    assert_eq!(first.progress.interval_days(), 1);
    assert_eq!(day0.stats().get_due_count(USER).await.unwrap().due_this_week, 1);

    let day1 = SrsEngine::new(&storage, Clock::fixed(start + Duration::days(1)));
    let batch = day1.queue().get_srs_batch(USER, None, None).await.unwrap();
    assert_eq!(batch.len(), 1);
    let mut progress = batch.into_iter().next().unwrap();
    day1.reviews()
        .update_srs(&mut progress, Quality::new(5).unwrap(), 2)
        .await
        .unwrap();
    assert_eq!(progress.srs_level(), 2);
    assert_eq!(progress.interval_days(), 6);
    assert!(day1.queue().get_srs_batch(USER, None, None).await.unwrap().is_empty());

    let day7 = SrsEngine::new(&storage, Clock::fixed(start + Duration::days(7)));
    let mut progress = day7
        .queue()
        .get_srs_batch(USER, None, None)
        .await
        .unwrap()
        .pop()
        .unwrap();
    day7.reviews()
        .update_srs(&mut progress, Quality::new(5).unwrap(), 2)
        .await
        .unwrap();
    assert_eq!(progress.srs_level(), 3);
    assert_eq!(progress.interval_days(), 17);
    assert!((progress.ease_factor() - 2.8).abs() < 1e-9);

    let history = day7.reviews().review_history(USER, word).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].after, progress.snapshot());

    let stats = day7.stats().get_srs_stats(USER).await.unwrap();
    assert_eq!(stats.total_words, 2);
    assert_eq!(stats.by_srs_level.get(&0), Some(&1));
    assert_eq!(stats.by_srs_level.get(&3), Some(&1));
    assert!((stats.retention_rate - 1.0).abs() < 1e-9);
    assert!((stats.avg_reviews_per_word - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn failed_words_surface_as_mistakes() {
    let engine = SrsEngine::in_memory(Clock::fixed(fixed_now()));
    let reviews = engine.reviews();

    for (id, hanzi) in [(1, "猫"), (2, "狗"), (3, "鸟")] {
        let word = register(&engine, id, hanzi, 2).await;
        reviews.initialize_word_progress(USER, word).await.unwrap();
    }

    reviews.record_answer(USER, WordId::new(1), false, 5).await.unwrap();
    reviews.record_answer(USER, WordId::new(2), true, 5).await.unwrap();
    reviews.record_answer(USER, WordId::new(2), false, 5).await.unwrap();

    let mistakes = engine.queue().get_mistakes_batch(USER, None, None).await.unwrap();
    let ids: Vec<u64> = mistakes.iter().map(|p| p.word_id().value()).collect();
    assert_eq!(ids, vec![2, 1]);

    let other_level = engine
        .queue()
        .get_mistakes_batch(USER, None, Some(1))
        .await
        .unwrap();
    assert!(other_level.is_empty());
}

#[tokio::test]
async fn sqlite_engine_applies_and_rejects_stale_reviews() {
    let engine = SrsEngine::sqlite(
        "sqlite:file:srs_flow_engine?mode=memory&cache=shared",
        Clock::fixed(fixed_now()),
    )
    .await
    .unwrap();
    let word = register(&engine, 8, "学习", 1).await;

    let reviews = engine.reviews();
    let initial = reviews.initialize_word_progress(USER, word).await.unwrap();
    let again = reviews.initialize_word_progress(USER, word).await.unwrap();
    assert_eq!(initial, again);

    let mut current = initial.clone();
    reviews
        .update_srs(&mut current, Quality::new(4).unwrap(), 6)
        .await
        .unwrap();
    reviews
        .update_srs(&mut current, Quality::new(2).unwrap(), 6)
        .await
        .unwrap();
    assert_eq!(current.srs_level(), 0);
    assert_eq!(current.interval_days(), 1);
    assert!((current.ease_factor() - 2.3).abs() < 1e-9);

    let mut stale = initial;
    let err = reviews
        .update_srs(&mut stale, Quality::new(5).unwrap(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, SrsServiceError::Storage(StorageError::Conflict)));

    let history = reviews.review_history(USER, word).await.unwrap();
    assert_eq!(history.len(), 2);
    let qualities: Vec<u8> = history.iter().map(|e| e.quality.value()).collect();
    assert_eq!(qualities, vec![4, 2]);

    let stats = engine.stats().get_srs_stats(USER).await.unwrap();
    assert!((stats.retention_rate - 0.5).abs() < 1e-9);
    assert_eq!(stats.upcoming_reviews[1].count, 1);
}

#[tokio::test]
async fn sqlite_forecast_buckets_reviews_by_utc_day() {
    let url = "sqlite:file:srs_flow_forecast?mode=memory&cache=shared";
    let repo = SqliteRepository::connect(url).await.unwrap();
    repo.migrate().await.unwrap();
    let storage = Storage::from_backend(repo);

    let today = fixed_now().date_naive();
    let tomorrow = start_of_day(today + Duration::days(1));
    let day0 = SrsEngine::new(&storage, Clock::fixed(tomorrow - Duration::hours(12)));
    let start_of_today = SrsEngine::new(&storage, Clock::fixed(tomorrow - Duration::days(1)));

    let early = register(&day0, 1, "早", 1).await;
    let midnight = register(&day0, 2, "夜", 1).await;
    // Reviewed at 00:00 today: due at exactly 00:00 tomorrow.
    start_of_today.reviews().initialize_word_progress(USER, midnight).await.unwrap();
    start_of_today.reviews().update_srs_by_word(USER, midnight, 4, 1).await.unwrap();
    // Reviewed at noon yesterday: due at noon today.
    day0.reviews().initialize_word_progress(USER, early).await.unwrap();
    SrsEngine::new(&storage, Clock::fixed(tomorrow - Duration::hours(36)))
        .reviews()
        .update_srs_by_word(USER, early, 4, 1)
        .await
        .unwrap();

    let stats = day0.stats().get_srs_stats(USER).await.unwrap();
    let dates: Vec<_> = stats.upcoming_reviews.iter().map(|u| u.date).collect();
    assert_eq!(dates.len(), 7);
    assert_eq!(dates[0], today);
    assert!(dates.windows(2).all(|d| d[1] == d[0] + Duration::days(1)));

    let counts: Vec<u64> = stats.upcoming_reviews.iter().map(|u| u.count).collect();
    assert_eq!(counts, vec![1, 1, 0, 0, 0, 0, 0]);
}
