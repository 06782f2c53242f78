//! Behaviour every `BranchStore` backend must share. Each backend's test
//! module calls these against a fresh instance.

use chrono::{DateTime, Duration, Utc};
use sidechat_core::branch::{BranchState, SubChatBranch};
use sidechat_core::knowledge::MergedKnowledge;
use sidechat_core::message::{BranchId, ConversationId, KnowledgeId, Turn, UserId};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::store::BranchStore;

/// A record merged `age_minutes` before `now`.
pub fn knowledge(
    id: &str,
    conversation: &str,
    age_minutes: i64,
    now: DateTime<Utc>,
) -> MergedKnowledge {
    MergedKnowledge {
        id: KnowledgeId::from(id),
        conversation_id: ConversationId::from(conversation),
        parent_message_id: "m1".into(),
        source_branch_id: BranchId::from(id),
        selected_text: "snippet".into(),
        short_summary: format!("short {id}"),
        detailed_summary: format!("detailed {id}"),
        topic: "topic".into(),
        question_count: 1,
        merged_at: now - Duration::minutes(age_minutes),
        fallback: false,
    }
}

fn ids(records: &[MergedKnowledge]) -> Vec<String> {
    let mut ids: Vec<String> = records.iter().map(|k| k.id.0.clone()).collect();
    ids.sort();
    ids
}

pub async fn branch_roundtrip(store: &dyn BranchStore) {
    let user = UserId::from("alice");
    let mut branch = SubChatBranch::open(ConversationId::from("c1"), "m1", "parent", "sel");
    branch.transition(BranchState::Active);
    branch.turns.push(Turn::user("question"));
    store.put_branch(&user, branch.clone()).await.unwrap();

    let loaded = store.get_branch(&user, &branch.id).await.unwrap().unwrap();
    assert_eq!(loaded.state, BranchState::Active);
    assert_eq!(loaded.turns.len(), 1);
    assert_eq!(loaded.selected_text, "sel");

    branch.transition(BranchState::Discarded);
    branch.turns.clear();
    store.put_branch(&user, branch.clone()).await.unwrap();
    let loaded = store.get_branch(&user, &branch.id).await.unwrap().unwrap();
    assert_eq!(loaded.state, BranchState::Discarded);
    assert!(loaded.turns.is_empty());

    let listed = store
        .list_branches(&user, &ConversationId::from("c1"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(
        store
            .list_branches(&user, &ConversationId::from("other"))
            .await
            .unwrap()
            .is_empty()
    );
}

pub async fn knowledge_written_to_both_scopes(store: &dyn BranchStore) {
    let user = UserId::from("alice");
    let now = Utc::now();
    let policy = RetentionPolicy::default();
    let k = knowledge("k1", "c1", 0, now);

    let report = store.put_knowledge(&user, k.clone(), &policy, now).await.unwrap();
    assert!(report.indexed);
    assert!(report.evicted.is_empty());

    let local = store
        .list_by_conversation(&user, &ConversationId::from("c1"))
        .await
        .unwrap();
    assert_eq!(local, vec![k.clone()]);
    assert_eq!(store.list_cross_conversation(&user).await.unwrap(), vec![k.clone()]);
    assert_eq!(store.get_knowledge(&user, &k.id).await.unwrap(), Some(k.clone()));

    // a second write of the same id never duplicates the index
    let report = store.put_knowledge(&user, k, &policy, now).await.unwrap();
    assert!(!report.indexed);
    assert_eq!(store.list_cross_conversation(&user).await.unwrap().len(), 1);
}

pub async fn cross_index_capped_oldest_first(store: &dyn BranchStore) {
    let user = UserId::from("alice");
    let now = Utc::now();
    let policy = RetentionPolicy::default();

    // 50 records, k00 the oldest
    for i in 0..50 {
        let k = knowledge(&format!("k{i:02}"), "c1", 100 - i, now);
        store.put_knowledge(&user, k, &policy, now).await.unwrap();
    }
    assert_eq!(store.list_cross_conversation(&user).await.unwrap().len(), 50);

    let report = store
        .put_knowledge(&user, knowledge("k50", "c2", 0, now), &policy, now)
        .await
        .unwrap();
    assert_eq!(report.evicted, vec![KnowledgeId::from("k00")]);

    let cross = store.list_cross_conversation(&user).await.unwrap();
    assert_eq!(cross.len(), 50);
    assert!(!cross.iter().any(|k| k.id.as_str() == "k00"));
    assert!(cross.iter().any(|k| k.id.as_str() == "k50"));

    // conversation scope is never trimmed by the cap
    let local = store
        .list_by_conversation(&user, &ConversationId::from("c1"))
        .await
        .unwrap();
    assert_eq!(local.len(), 50);
}

pub async fn sweep_removes_expired_from_cross_index_only(store: &dyn BranchStore) {
    let user = UserId::from("alice");
    let now = Utc::now();
    let then = now - Duration::days(40);
    let policy = RetentionPolicy::default();

    store
        .put_knowledge(&user, knowledge("old", "c1", 0, then), &policy, then)
        .await
        .unwrap();
    store
        .put_knowledge(&user, knowledge("new", "c1", 0, now), &policy, now)
        .await
        .unwrap();

    // the write at `now` already swept opportunistically
    assert_eq!(ids(&store.list_cross_conversation(&user).await.unwrap()), vec!["new"]);

    let report = store.delete_expired(&policy, now).await.unwrap();
    assert_eq!(report.total(), 0);

    let local = store
        .list_by_conversation(&user, &ConversationId::from("c1"))
        .await
        .unwrap();
    assert_eq!(ids(&local), vec!["new", "old"]);
}

pub async fn sweep_can_purge_conversation_scope(store: &dyn BranchStore) {
    let user = UserId::from("alice");
    let then = Utc::now() - Duration::days(40);
    let policy = RetentionPolicy {
        purge_conversation_scope: true,
        ..RetentionPolicy::default()
    };

    store
        .put_knowledge(&user, knowledge("old", "c1", 0, then), &policy, then)
        .await
        .unwrap();

    let report = store.delete_expired(&policy, Utc::now()).await.unwrap();
    assert_eq!(report.cross_conversation_removed, 1);
    assert_eq!(report.conversation_removed, 1);
    assert!(
        store
            .list_by_conversation(&user, &ConversationId::from("c1"))
            .await
            .unwrap()
            .is_empty()
    );
}

pub async fn users_are_isolated(store: &dyn BranchStore) {
    let now = Utc::now();
    let policy = RetentionPolicy::default();
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    store
        .put_knowledge(&alice, knowledge("k1", "c1", 0, now), &policy, now)
        .await
        .unwrap();

    assert!(store.list_cross_conversation(&bob).await.unwrap().is_empty());
    assert!(
        store
            .get_knowledge(&bob, &KnowledgeId::from("k1"))
            .await
            .unwrap()
            .is_none()
    );
}
