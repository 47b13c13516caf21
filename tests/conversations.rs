mod common;

use std::sync::Arc;

use conversation_sync::content::{Content, FileMeta, GifMeta};
use conversation_sync::conversation::store::ConversationStore;
use conversation_sync::conversation::{self, Error};
use conversation_sync::message::model::Message;
use conversation_sync::user;

use common::{at, direct_conversation, text_message, TestBackend};

async fn store_with_conversation(
    backend: &Arc<TestBackend>,
) -> (ConversationStore, conversation::Id, user::Id, user::Id) {
    let me = user::Id::random();
    let other = user::Id::random();
    let conversation = direct_conversation(me, other);
    let id = conversation.id;
    backend.seed_conversation(conversation);

    let store = ConversationStore::new(backend.clone(), me);
    store.load().await.unwrap();
    (store, id, me, other)
}

#[tokio::test]
async fn unread_counts_inserts_and_resets_on_mark_read() {
    let backend = TestBackend::new();
    let (store, id, _, other) = store_with_conversation(&backend).await;

    for i in 0..3 {
        store
            .apply_new_message(&text_message(id, other, &format!("m{i}"), at(i)))
            .await;
    }
    assert_eq!(store.get(&id).await.unwrap().unread_count, 3);

    store.mark_read(&id).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap().unread_count, 0);

    // an insert arriving after the reset still lands
    store
        .apply_new_message(&text_message(id, other, "late", at(10)))
        .await;
    assert_eq!(store.get(&id).await.unwrap().unread_count, 1);
}

#[tokio::test]
async fn own_messages_bump_the_preview_but_not_the_counter() {
    let backend = TestBackend::new();
    let (store, id, me, _) = store_with_conversation(&backend).await;

    store
        .apply_new_message(&text_message(id, me, "mine", at(0)))
        .await;

    let conversation = store.get(&id).await.unwrap();
    assert_eq!(conversation.unread_count, 0);
    assert_eq!(conversation.last_message.unwrap().preview, "mine");
}

#[tokio::test]
async fn replayed_inserts_do_not_double_count() {
    let backend = TestBackend::new();
    let (store, id, _, other) = store_with_conversation(&backend).await;

    let message = text_message(id, other, "once", at(0));
    store.apply_new_message(&message).await;
    store.apply_new_message(&message).await;

    assert_eq!(store.get(&id).await.unwrap().unread_count, 1);
}

#[tokio::test]
async fn out_of_order_inserts_do_not_regress_the_preview() {
    let backend = TestBackend::new();
    let (store, id, _, other) = store_with_conversation(&backend).await;

    store
        .apply_new_message(&text_message(id, other, "newest", at(10)))
        .await;
    store
        .apply_new_message(&text_message(id, other, "stale", at(5)))
        .await;

    let conversation = store.get(&id).await.unwrap();
    assert_eq!(conversation.last_message.unwrap().preview, "newest");
    assert_eq!(conversation.unread_count, 2);
}

#[tokio::test]
async fn list_orders_by_recency_and_badge_sums_unread() {
    let backend = TestBackend::new();
    let me = user::Id::random();
    let other = user::Id::random();
    let first = direct_conversation(me, other);
    let second = direct_conversation(me, other);
    let (first_id, second_id) = (first.id, second.id);
    backend.seed_conversation(first);
    backend.seed_conversation(second);

    let store = ConversationStore::new(backend.clone(), me);
    store.load().await.unwrap();

    store
        .apply_new_message(&text_message(first_id, other, "a", at(0)))
        .await;
    store
        .apply_new_message(&text_message(second_id, other, "b", at(5)))
        .await;

    let list = store.list().await;
    assert_eq!(list[0].id, second_id);
    assert_eq!(list[1].id, first_id);
    assert_eq!(store.total_unread().await, 2);

    store
        .apply_new_message(&text_message(first_id, other, "c", at(9)))
        .await;
    assert_eq!(store.list().await[0].id, first_id);
    assert_eq!(store.total_unread().await, 3);
}

#[tokio::test]
async fn muted_conversations_still_record_unread_truth() {
    let backend = TestBackend::new();
    let (store, id, _, other) = store_with_conversation(&backend).await;

    store.set_muted(&id, true).await.unwrap();
    store
        .apply_new_message(&text_message(id, other, "psst", at(0)))
        .await;

    let conversation = store.get(&id).await.unwrap();
    assert!(conversation.muted);
    assert_eq!(conversation.unread_count, 1);
}

#[tokio::test]
async fn previews_come_from_decoded_content() {
    let backend = TestBackend::new();
    let (store, id, _, other) = store_with_conversation(&backend).await;

    let voice = FileMeta {
        url: "https://files.test/v.webm".into(),
        file_type: Some("audio/webm".into()),
        ..FileMeta::default()
    };
    let mut message = Message::new(id, other, &Content::File(voice));
    message.created_at = at(0);
    store.apply_new_message(&message).await;
    assert_eq!(
        store.get(&id).await.unwrap().last_message.unwrap().preview,
        "Voice message"
    );

    let gif = GifMeta {
        url: "https://media.giphy.com/media/x/giphy.gif".into(),
        title: None,
    };
    let mut message = Message::new(id, other, &Content::Gif(gif));
    message.created_at = at(1);
    store.apply_new_message(&message).await;
    assert_eq!(
        store.get(&id).await.unwrap().last_message.unwrap().preview,
        "GIF"
    );
}

#[tokio::test]
async fn editing_the_latest_message_refreshes_the_preview() {
    let backend = TestBackend::new();
    let (store, id, _, other) = store_with_conversation(&backend).await;

    let older = text_message(id, other, "older", at(0));
    let latest = text_message(id, other, "latets", at(5));
    store.apply_new_message(&older).await;
    store.apply_new_message(&latest).await;

    store.apply_update(&id, &latest.id, "latest").await;
    assert_eq!(
        store.get(&id).await.unwrap().last_message.unwrap().preview,
        "latest"
    );

    // edits of anything but the tail leave the preview alone
    store.apply_update(&id, &older.id, "rewritten").await;
    assert_eq!(
        store.get(&id).await.unwrap().last_message.unwrap().preview,
        "latest"
    );
}

#[tokio::test]
async fn participant_checks_guard_sends() {
    let backend = TestBackend::new();
    let (store, id, me, _) = store_with_conversation(&backend).await;

    store.check_participant(&id, &me).await.unwrap();

    let stranger = user::Id::random();
    assert!(matches!(
        store.check_participant(&id, &stranger).await,
        Err(Error::NotParticipant(u)) if u == stranger
    ));

    let missing = conversation::Id::random();
    assert!(matches!(
        store.check_participant(&missing, &me).await,
        Err(Error::NotFound(c)) if c == missing
    ));
}
