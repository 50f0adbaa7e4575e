use std::sync::Arc;
use std::time::Duration;

use orgdraw::credentials::Credential;
use orgdraw::database::{Database, DatabaseConfig};
use orgdraw::serve::{ServeState, build_router};
use orgdraw::{Autosave, ClientError, DiagramClient, Editor, EditorSettings};
use tempfile::TempDir;
use tokio::net::TcpListener;

const QUICK: Duration = Duration::from_millis(100);

async fn start_server(dir: &TempDir) -> (String, String) {
    let db = Database::new(DatabaseConfig::at(dir.path().join("orgdraw.db")))
        .await
        .unwrap();
    let token = Credential::issue(db.pool(), "ada").await.unwrap().token;
    let app = build_router(ServeState::new(db, "white"), None);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), token)
}

#[tokio::test]
async fn editor_changes_reach_the_server() {
    let dir = TempDir::new().unwrap();
    let (base_url, token) = start_server(&dir).await;
    let client = DiagramClient::new(base_url, token).unwrap();

    let record = client.create("Leadership").await.unwrap();
    let mut editor = Editor::new(record.content.clone(), EditorSettings::default());
    let autosave = Autosave::spawn(
        record.id.clone(),
        editor.subscribe(),
        Arc::new(client.clone()),
        QUICK,
    );

    editor.add_node();
    editor.add_node();
    tokio::time::sleep(QUICK * 5).await;
    let saved = client.get(&record.id).await.unwrap();
    assert_eq!(saved.content.nodes.len(), 2);
    assert!(saved.updated_at >= record.updated_at);

    // teardown does not wait for the quiet period
    editor.add_node();
    autosave.teardown().await;
    let saved = client.get(&record.id).await.unwrap();
    assert_eq!(saved.content, *editor.content());

    let summaries = client.list().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].node_count, 3);
}

#[tokio::test]
async fn client_errors_are_typed() {
    let dir = TempDir::new().unwrap();
    let (base_url, token) = start_server(&dir).await;

    let stranger = DiagramClient::new(base_url.clone(), "not-a-token").unwrap();
    assert!(matches!(stranger.list().await, Err(ClientError::Unauthorized)));

    let client = DiagramClient::new(base_url, token).unwrap();
    assert!(matches!(
        client.get("diagram-missing").await,
        Err(ClientError::NotFound)
    ));
    assert!(matches!(
        client.create("  ").await,
        Err(ClientError::Status { status, .. }) if status.as_u16() == 400
    ));

    let record = client.create("Temporary").await.unwrap();
    client.delete(&record.id).await.unwrap();
    assert!(client.list().await.unwrap().is_empty());
    assert!(matches!(
        client.delete(&record.id).await,
        Err(ClientError::NotFound)
    ));
}
