//! Storage tests over an in-memory SQLite database.

use brain_dump_bot::storage::{SqliteStorage, Storage, ThoughtStatus};
use chrono::{Duration, Utc};

const USER: i64 = 100;

fn store() -> SqliteStorage {
    SqliteStorage::open_in_memory().expect("in-memory database should open")
}

fn seeded() -> SqliteStorage {
    let storage = store();
    storage.ensure_user(USER, Some("tester")).unwrap();
    storage
}

#[test]
fn open_persists_across_reconnects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thoughts.db");
    let path = path.to_str().unwrap();
    {
        let storage = SqliteStorage::open(path).unwrap();
        storage.ensure_user(USER, Some("tester")).unwrap();
        storage.save_thought(USER, "persisted", "tasks", &[]).unwrap();
    }
    let storage = SqliteStorage::open(path).unwrap();
    assert_eq!(storage.all_user_ids().unwrap(), vec![USER]);
    assert_eq!(
        storage
            .thoughts_by_status(USER, ThoughtStatus::Active, 10)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn ensure_user_is_idempotent_and_updates_username() {
    let storage = store();
    storage.ensure_user(USER, Some("first")).unwrap();
    storage.ensure_user(USER, Some("second")).unwrap();
    storage.ensure_user(200, None).unwrap();
    assert_eq!(storage.all_user_ids().unwrap(), vec![USER, 200]);
}

#[test]
fn saved_thoughts_come_back_newest_first() {
    let storage = seeded();
    let first = storage
        .save_thought(USER, "pay rent", "tasks", &["money".to_string()])
        .unwrap();
    let second = storage
        .save_thought(USER, "gym idea", "goals", &["health".to_string()])
        .unwrap();
    assert!(second > first);

    let thoughts = storage
        .recent_thoughts(USER, 7, ThoughtStatus::Active)
        .unwrap();
    assert_eq!(thoughts.len(), 2);
    // created_at ties resolve by insertion, but both must be present and active
    assert!(thoughts.iter().all(|t| t.status == ThoughtStatus::Active));
    assert!(thoughts.iter().any(|t| t.text == "pay rent"));
    assert_eq!(
        thoughts.iter().find(|t| t.id == first).unwrap().topics,
        vec!["money".to_string()]
    );
}

#[test]
fn recent_thoughts_scopes_by_user_and_status() {
    let storage = seeded();
    storage.ensure_user(200, None).unwrap();
    storage.save_thought(USER, "mine", "tasks", &[]).unwrap();
    storage.save_thought(200, "theirs", "tasks", &[]).unwrap();

    let mine = storage
        .recent_thoughts(USER, 7, ThoughtStatus::Active)
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].text, "mine");

    assert!(storage
        .recent_thoughts(USER, 7, ThoughtStatus::Archived)
        .unwrap()
        .is_empty());
}

#[test]
fn update_status_moves_thought_between_views() {
    let storage = seeded();
    let id = storage.save_thought(USER, "old news", "tasks", &[]).unwrap();
    assert!(storage
        .update_status(USER, id, ThoughtStatus::Archived)
        .unwrap());
    // Unknown id and wrong user both report no change
    assert!(!storage
        .update_status(USER, 9999, ThoughtStatus::Archived)
        .unwrap());
    assert!(!storage
        .update_status(200, id, ThoughtStatus::Active)
        .unwrap());

    let archived = storage
        .thoughts_by_status(USER, ThoughtStatus::Archived, 10)
        .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, id);
    assert!(storage
        .thoughts_by_status(USER, ThoughtStatus::Active, 10)
        .unwrap()
        .is_empty());
}

#[test]
fn archive_many_counts_only_real_changes() {
    let storage = seeded();
    let a = storage.save_thought(USER, "a", "tasks", &[]).unwrap();
    let b = storage.save_thought(USER, "b", "tasks", &[]).unwrap();
    let count = storage.archive_many(USER, &[a, b, 777]).unwrap();
    assert_eq!(count, 2);
}

#[test]
fn delete_many_and_delete_all_remove_rows() {
    let storage = seeded();
    let a = storage.save_thought(USER, "a", "tasks", &[]).unwrap();
    let _b = storage.save_thought(USER, "b", "tasks", &[]).unwrap();
    let c = storage.save_thought(USER, "c", "tasks", &[]).unwrap();

    assert_eq!(storage.delete_many(USER, &[a, c, 777]).unwrap(), 2);
    assert_eq!(storage.delete_all(USER).unwrap(), 1);
    assert!(storage
        .thoughts_by_status(USER, ThoughtStatus::Active, 10)
        .unwrap()
        .is_empty());
}

#[test]
fn full_text_search_finds_active_thoughts_only() {
    let storage = seeded();
    let hit = storage
        .save_thought(USER, "remember to water the plants", "tasks", &[])
        .unwrap();
    storage
        .save_thought(USER, "totally unrelated", "ideas", &[])
        .unwrap();
    let archived = storage
        .save_thought(USER, "water bill is due", "tasks", &[])
        .unwrap();
    storage
        .update_status(USER, archived, ThoughtStatus::Archived)
        .unwrap();

    let matches = storage.search_thoughts(USER, "water").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, hit);
}

#[test]
fn search_treats_the_term_verbatim() {
    let storage = seeded();
    storage
        .save_thought(USER, "call mom about dinner", "tasks", &[])
        .unwrap();
    // Quotes and operators in user input must not break the query
    assert!(storage.search_thoughts(USER, "mom\" OR \"x").unwrap().is_empty());
    assert_eq!(storage.search_thoughts(USER, "mom").unwrap().len(), 1);
}

#[test]
fn deleted_thoughts_leave_the_search_index() {
    let storage = seeded();
    let id = storage
        .save_thought(USER, "ephemeral musing", "reflections", &[])
        .unwrap();
    assert_eq!(storage.search_thoughts(USER, "ephemeral").unwrap().len(), 1);
    storage.delete_many(USER, &[id]).unwrap();
    assert!(storage.search_thoughts(USER, "ephemeral").unwrap().is_empty());
}

#[test]
fn summaries_count_active_thoughts() {
    let storage = seeded();
    storage
        .save_thought(USER, "a", "tasks", &["work".to_string()])
        .unwrap();
    storage
        .save_thought(USER, "b", "tasks", &["work".to_string(), "money".to_string()])
        .unwrap();
    storage.save_thought(USER, "c", "ideas", &[]).unwrap();

    let categories = storage.category_summary(USER).unwrap();
    assert_eq!(categories[0], ("tasks".to_string(), 2));
    assert_eq!(categories[1], ("ideas".to_string(), 1));

    let topics = storage.topic_summary(USER).unwrap();
    assert_eq!(topics[0], ("work".to_string(), 2));
    assert_eq!(topics[1], ("money".to_string(), 1));
}

#[test]
fn user_stats_reflect_totals() {
    let storage = seeded();
    storage.save_thought(USER, "a", "tasks", &[]).unwrap();
    storage.save_thought(USER, "b", "ideas", &[]).unwrap();

    let stats = storage.user_stats(USER).unwrap().expect("stats for known user");
    assert_eq!(stats.total_thoughts, 2);
    assert!(stats.joined_at <= Utc::now());
    assert_eq!(stats.categories.len(), 2);

    assert!(storage.user_stats(404).unwrap().is_none());
}

#[test]
fn review_prompt_timestamps_round_trip() {
    let storage = seeded();
    assert!(storage.last_review_prompt(USER).unwrap().is_none());

    let at = Utc::now() - Duration::hours(2);
    storage.mark_review_prompted(USER, at).unwrap();
    let loaded = storage
        .last_review_prompt(USER)
        .unwrap()
        .expect("prompt timestamp saved");
    assert!((loaded - at).num_seconds().abs() < 1);
}
