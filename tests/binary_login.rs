//! End-to-end binary-dialect handshake against a local mock service
//! (spec §4.F, §8 "Binary framing").

use std::time::Duration;

use fc_chat_core::{Client, ClientOptions, ConnectionState, DialTarget};
use fc_protocol::FcType;
use fc_test_support::MockBinaryServer;

#[tokio::test]
async fn login_reaches_active_and_drains_roomdata_subscription() {
    let server = MockBinaryServer::bind().await.expect("bind mock binary server");
    let addr = server.addr();

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await.expect("accept client connection");

        let login = conn.recv().await.expect("read io").expect("login frame");
        assert_eq!(login.fc_type, FcType::Login);

        conn.send_login_ack(100, 7, "testuser").await.expect("send login ack");

        let roomdata = conn.recv().await.expect("read io").expect("roomdata subscription");
        assert_eq!(roomdata.fc_type, FcType::RoomData);

        conn.close().await;
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
    client.connect(true).await.expect("connect and log in");

    assert_eq!(client.state(), ConnectionState::Active);

    server_task.await.expect("mock server task panicked");
}
