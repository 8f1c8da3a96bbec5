//! End-to-end text/WebSocket-dialect handshake against a local mock service
//! (spec §4.F, §8 "Text noise filter").

use std::time::Duration;

use fc_chat_core::{Client, ClientOptions, ConnectionState, DialTarget};
use fc_protocol::FcType;
use fc_test_support::MockTextServer;

#[tokio::test]
async fn login_reaches_active_over_websocket() {
    let server = MockTextServer::bind().await.expect("bind mock text server");
    let addr = server.addr();

    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await.expect("accept websocket connection");
        conn.recv_hello().await.expect("read hello greeting");

        let login = conn.recv().await.expect("read io").expect("login frame");
        assert_eq!(login.fc_type, FcType::Login);

        conn.send_login_ack(200, 9, "wsuser").await.expect("send login ack");

        let roomdata = conn.recv().await.expect("read io").expect("roomdata subscription");
        assert_eq!(roomdata.fc_type, FcType::RoomData);

        conn.close().await;
    });

    let options = ClientOptions {
        use_web_sockets: true,
        dial_override: Some(DialTarget {
            host: addr.to_string(),
            binary_port: 0,
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
