mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use fsd_server::runtime::Daemon;

use support::test_config;

const LIMIT: Duration = Duration::from_secs(10);

async fn http_get(addr: std::net::SocketAddr, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await?;
    Ok(raw)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_serves_samples_and_shuts_down_cleanly() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = test_config(dir.path());
    config.metadata_update_interval = Duration::from_millis(100);
    // Nested so startup has to create it.
    config.watch_dir = dir.path().join("nested/root");

    let daemon = Daemon::start(Arc::new(config)).await?;
    let addr = daemon.local_addr();
    let root = daemon.root().to_path_buf();
    let db = daemon.database().clone();
    assert!(root.is_dir());

    let health = http_get(addr, "/healthz").await?;
    assert!(health.starts_with("HTTP/1.1 200"), "{health}");
    assert!(health.contains(r#"{"status":"ok"}"#), "{health}");

    std::fs::write(root.join("hello.txt"), b"hi")?;
    let wanted = root.join("hello.txt").display().to_string();
    let metadata = db.metadata();
    tokio::time::timeout(LIMIT, async {
        loop {
            if let Ok(rows) = metadata.rows_for_path(&wanted).await
                && !rows.is_empty()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await?;

    let disk = http_get(addr, "/disk/latest").await?;
    assert!(disk.starts_with("HTTP/1.1 200"), "{disk}");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(daemon.run_until(async move {
        let _ = stop_rx.await;
    }));
    let _ = stop_tx.send(());

    tokio::time::timeout(LIMIT, running).await???;
    assert!(TcpStream::connect(addr).await.is_err());
    Ok(())
}

#[tokio::test]
async fn unbindable_listen_address_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = test_config(dir.path());
    config.listen_addr = "not-an-address".into();

    let err = Daemon::start(Arc::new(config)).await.unwrap_err();
    assert!(err.to_string().contains("failed to bind"), "{err}");
    Ok(())
}
