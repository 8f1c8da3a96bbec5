//! End-to-end EXTDATA HTTP-indirection round trip (spec §4.E "EXTDATA").
//!
//! The synthesized payload carries `lv:4` so the recursed DETAILS-group
//! handler auto-creates the model; the worked example in the distilled
//! wire contract describes the same outcome (model 42 existing afterward)
//! without spelling out `lv` on the fetched body, which conflicts with the
//! per-type auto-create rule this dispatcher otherwise follows — `lv:4`
//! here reconciles the two.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use fc_chat_core::{Client, ClientOptions, DialTarget, HttpError, HttpGet, LocalEmoteEncoder, SharedRegistry};
use fc_protocol::FcType;
use fc_test_support::MockBinaryServer;
use tokio::sync::oneshot;

struct StubHttpGet {
    body: String,
    called: AtomicBool,
}

#[async_trait]
impl HttpGet for StubHttpGet {
    async fn get(&self, _url: &str) -> Result<String, HttpError> {
        self.called.store(true, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

#[tokio::test]
async fn extdata_indirection_creates_model_from_fetched_body() {
    let server = MockBinaryServer::bind().await.expect("bind mock binary server");
    let addr = server.addr();

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await.expect("accept client connection");

        let login = conn.recv().await.expect("read io").expect("login frame");
        assert_eq!(login.fc_type, FcType::Login);
        conn.send_login_ack(100, 7, "testuser").await.expect("send login ack");

        let roomdata = conn.recv().await.expect("read io").expect("roomdata subscription");
        assert_eq!(roomdata.fc_type, FcType::RoomData);

        let extdata_payload = serde_json::json!({
            "respkey": "R",
            "opts": "o",
            "type": 5,
            "msg": {"type": FcType::TxProfile.to_i32(), "from": 0, "to": 0, "arg1": 0, "arg2": 0},
        })
        .to_string();
        conn.send(FcType::ExtData, 0, 100, 0, 6, Some(&extdata_payload))
            .await
            .expect("send extdata frame");

        conn
    });

    let options = ClientOptions {
        use_web_sockets: false,
        dial_override: Some(DialTarget {
            host: addr.ip().to_string(),
            binary_port: addr.port(),
            ws_path: "/fcsl",
            ws_scheme: "ws",
        }),
        login_timeout: Duration::from_secs(5),
        ..ClientOptions::default()
    };

    let registry = SharedRegistry::new();
    let http = Arc::new(StubHttpGet {
        body: serde_json::json!({"uid": 42, "vs": 90, "lv": 4}).to_string(),
        called: AtomicBool::new(false),
    });

    let client = Client::with_collaborators(
        options,
        "user",
        "pass",
        registry.clone(),
        http.clone(),
        Arc::new(LocalEmoteEncoder),
    );

    let (done_tx, done_rx) = oneshot::channel();
    let done_tx = Arc::new(StdMutex::new(Some(done_tx)));
    client.events().on("TXPROFILE", move |_| {
        if let Some(tx) = done_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    });

    client.connect(true).await.expect("connect and log in");

    tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .expect("TXPROFILE event within timeout")
        .expect("event listener fired");

    assert!(http.called.load(Ordering::SeqCst));

    let model_vs = {
        let reg = registry.inner();
        let reg = reg.lock().unwrap();
        let model = reg.get(42).expect("model 42 auto-created from fetched body");
        model.best_session().vs()
    };
    assert_eq!(model_vs, Some(90));

    let _ = server_task.await;
}
