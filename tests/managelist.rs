//! End-to-end `CLIENT_MODELSLOADED` via a `MANAGELIST` cams+tags scenario
//! (spec §4.E "MANAGELIST", §4.G "ConnectAndWaitForModels").

use std::time::Duration;

use fc_chat_core::{Client, ClientOptions, DialTarget};
use fc_protocol::FcType;
use fc_test_support::MockBinaryServer;

#[tokio::test]
async fn connect_and_wait_for_models_resolves_after_cams_then_tags() {
    let server = MockBinaryServer::bind().await.expect("bind mock binary server");
    let addr = server.addr();

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await.expect("accept client connection");

        let login = conn.recv().await.expect("read io").expect("login frame");
        assert_eq!(login.fc_type, FcType::Login);
        conn.send_login_ack(100, 7, "testuser").await.expect("send login ack");

        let roomdata = conn.recv().await.expect("read io").expect("roomdata subscription");
        assert_eq!(roomdata.fc_type, FcType::RoomData);

        let cams = serde_json::json!({
            "kind": "cams",
            "rdata": [
                ["uid", "nm", "lv", "vs", "camscore"],
                [55, "alice", 4, 90, 80],
            ],
        })
        .to_string();
        conn.send(FcType::ManageList, 0, 0, 0, 1, Some(&cams))
            .await
            .expect("send cams list");

        let tags = serde_json::json!({
            "kind": "tags",
            "rdata": {"55": ["blonde", "german"]},
        })
        .to_string();
        conn.send(FcType::ManageList, 0, 0, 0, 1, Some(&tags))
            .await
            .expect("send tags list");

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

    let client = Client::new(options, "user", "pass");

    tokio::time::timeout(Duration::from_secs(5), client.connect_and_wait_for_models())
        .await
        .expect("CLIENT_MODELSLOADED within timeout")
        .expect("connect succeeded");

    {
        let reg = client.registry().inner();
        let reg = reg.lock().unwrap();
        let model = reg.get(55).expect("model 55 loaded from the cams list");
        assert_eq!(model.best_session().vs(), Some(90));
        assert!(model.tags().contains("blonde"));
        assert!(model.tags().contains("german"));
    }

    let _ = server_task.await;
}
