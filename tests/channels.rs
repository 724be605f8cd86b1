//! Integration tests for channel creation, normalization, and
//! persistence through the application context.

use std::sync::Arc;

use parlor::app::ParlorApp;
use parlor::config::ParlorConfig;
use parlor::registry::ChannelCreation;
use parlor::stores::MemoryVectorStore;
use parlor::types::Topic;

async fn ephemeral_app() -> ParlorApp {
    ParlorApp::builder(ParlorConfig::default())
        .with_vector_store(Arc::new(MemoryVectorStore::new()))
        .ephemeral()
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn default_channels_are_seeded() {
    let app = ephemeral_app().await;
    assert_eq!(app.list_channels(), vec!["general", "vrp", "python"]);
}

#[tokio::test]
async fn create_channel_normalizes_the_name() {
    let app = ephemeral_app().await;
    let outcome = app.create_channel("alice", "New Topic!").await.unwrap();
    assert_eq!(
        outcome,
        ChannelCreation::Created(Topic::normalize("new_topic_"))
    );

    let channels = app.list_channels();
    assert!(channels.contains(&"new_topic_".to_string()));
    assert_eq!(
        channels.iter().filter(|c| c.as_str() == "new_topic_").count(),
        1
    );
}

#[tokio::test]
async fn create_channel_twice_is_idempotent() {
    let app = ephemeral_app().await;
    app.create_channel("alice", "Data Science").await.unwrap();
    let second = app.create_channel("bob", "data science").await.unwrap();
    assert!(matches!(second, ChannelCreation::AlreadyExists(_)));

    let channels = app.list_channels();
    assert_eq!(
        channels
            .iter()
            .filter(|c| c.as_str() == "data_science")
            .count(),
        1
    );
}

#[tokio::test]
async fn channels_persist_across_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ParlorConfig::default();
    config.storage.channels_file = dir.path().join("channels.json");
    config.storage.transcripts_file = dir.path().join("chat_history.json");

    {
        let app = ParlorApp::builder(config.clone())
            .with_vector_store(Arc::new(MemoryVectorStore::new()))
            .build()
            .await
            .unwrap();
        app.create_channel("alice", "embedded systems").await.unwrap();
    }

    let reopened = ParlorApp::builder(config)
        .with_vector_store(Arc::new(MemoryVectorStore::new()))
        .build()
        .await
        .unwrap();
    assert!(
        reopened
            .list_channels()
            .contains(&"embedded_systems".to_string())
    );
}
