//! gRPC-level tests against an in-process server using the raw generated stub.

use std::net::SocketAddr;
use std::time::Duration;

use netplay_server::{start_server, ServerConfig, ServerHandle};
use netplay_shared::proto::net_play_server_service_client::NetPlayServerServiceClient;
use netplay_shared::proto::plug_controller_response_pb::port_rejection_pb::Reason;
use netplay_shared::proto::{
    invalid_data_pb, make_console_response_pb, plug_controller_response_pb,
    start_game_response_pb, ClientReadyPb, IncomingEventPb, KeyStatePb, MakeConsoleRequestPb,
    OutgoingEventPb, PingPb, PlugControllerRequestPb, Port, ShutDownServerRequestPb,
    StartGameRequestPb,
};
use test_log::test;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Streaming;

type Stub = NetPlayServerServiceClient<Channel>;

async fn setup(config: ServerConfig) -> (ServerHandle, Stub) {
    let handle = start_server(config).await.unwrap();
    let stub = stub_for(handle.local_addr()).await;
    (handle, stub)
}

async fn stub_for(addr: SocketAddr) -> Stub {
    NetPlayServerServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap()
}

async fn make_console(stub: &mut Stub, md5: &str) -> i64 {
    let response = stub
        .make_console(MakeConsoleRequestPb {
            console_title: "Mario Kart".into(),
            rom_name: "mk64.z64".into(),
            rom_file_md5: md5.into(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status(), make_console_response_pb::Status::Success);
    response.console_id
}

fn plug_request(console_id: i64, delay_frames: i32, ports: &[Port]) -> PlugControllerRequestPb {
    let mut request = PlugControllerRequestPb {
        console_id,
        delay_frames,
        ..Default::default()
    };
    let mut ports = ports.iter().copied();
    request.set_requested_port_1(ports.next().unwrap_or(Port::Unknown));
    request.set_requested_port_2(ports.next().unwrap_or(Port::Unknown));
    request.set_requested_port_3(ports.next().unwrap_or(Port::Unknown));
    request.set_requested_port_4(ports.next().unwrap_or(Port::Unknown));
    request
}

struct EventStream {
    outbound: mpsc::Sender<OutgoingEventPb>,
    inbound: Streaming<IncomingEventPb>,
}

impl EventStream {
    async fn open(stub: &mut Stub) -> Self {
        let (outbound, rx) = mpsc::channel(16);
        let inbound = stub
            .send_event(ReceiverStream::new(rx))
            .await
            .unwrap()
            .into_inner();
        Self { outbound, inbound }
    }

    async fn send(&self, event: OutgoingEventPb) {
        self.outbound.send(event).await.unwrap();
    }

    async fn ready(&self, console_id: i64, client_id: i64) {
        self.send(OutgoingEventPb {
            client_ready: Some(ClientReadyPb {
                console_id,
                client_id,
            }),
            ..Default::default()
        })
        .await;
    }

    async fn next(&mut self) -> IncomingEventPb {
        tokio::time::timeout(Duration::from_secs(5), self.inbound.message())
            .await
            .expect("timed out waiting for an event")
            .unwrap()
            .expect("stream ended")
    }
}

fn key(console_id: i64, port: Port, frame: i32) -> KeyStatePb {
    let mut key = KeyStatePb {
        console_id,
        frame_number: frame,
        x_axis: frame * 10,
        ..Default::default()
    };
    key.set_port(port);
    key
}

async fn start_when_ready(stub: &mut Stub, console_id: i64) {
    for _ in 0..100 {
        let status = stub
            .start_game(StartGameRequestPb { console_id })
            .await
            .unwrap()
            .into_inner()
            .status();
        if status == start_game_response_pb::Status::Success {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("console {console_id} never became startable");
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn ping_echoes() {
    let (_handle, mut stub) = setup(ServerConfig::local_test()).await;
    let response = stub.ping(PingPb {}).await.unwrap().into_inner();
    assert_eq!(response, PingPb {});
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn console_limit_in_test_mode() {
    let (_handle, mut stub) = setup(ServerConfig::local_test()).await;
    for expected in 1..=10 {
        assert_eq!(make_console(&mut stub, "").await, expected);
    }
    let response = stub
        .make_console(MakeConsoleRequestPb::default())
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        response.status(),
        make_console_response_pb::Status::UnspecifiedFailure
    );
    assert_eq!(response.console_id, 0);
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn plug_controller_statuses() {
    use plug_controller_response_pb::Status;

    let (_handle, mut stub) = setup(ServerConfig::local_test()).await;
    let console_id = make_console(&mut stub, "abc").await;

    let unknown = stub
        .plug_controller(plug_request(99, 0, &[Port::Port1]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(unknown.status(), Status::UnspecifiedFailure);
    assert_eq!(unknown.console_id, 99);

    let none = stub
        .plug_controller(plug_request(console_id, 0, &[]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(none.status(), Status::NoPortsRequested);

    let mut mismatch = plug_request(console_id, 0, &[Port::Port1]);
    mismatch.rom_file_md5 = "def".into();
    let mismatch = stub.plug_controller(mismatch).await.unwrap().into_inner();
    assert_eq!(mismatch.status(), Status::RomMd5Mismatch);

    let first = stub
        .plug_controller(plug_request(console_id, 2, &[Port::PortAny, Port::Port3]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(first.status(), Status::Success);
    assert_eq!(first.console_id, console_id);
    assert_eq!(first.client_id, 1);
    assert_eq!(first.port().collect::<Vec<_>>(), vec![Port::Port1, Port::Port3]);

    let rejected = stub
        .plug_controller(plug_request(console_id, 0, &[Port::Port3, Port::Port2]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(rejected.status(), Status::PortRequestRejected);
    assert_eq!(rejected.client_id, 0);
    let reasons: Vec<(Port, Reason)> = rejected
        .port_rejections
        .iter()
        .map(|entry| (entry.port(), entry.reason()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            (Port::Port2, Reason::Acceptable),
            (Port::Port3, Reason::PortAlreadyOccupied),
        ]
    );
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn start_game_requires_ready_clients() {
    let (_handle, mut stub) = setup(ServerConfig::local_test()).await;
    let console_id = make_console(&mut stub, "").await;

    let empty = stub
        .start_game(StartGameRequestPb { console_id })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        empty.status(),
        start_game_response_pb::Status::UnspecifiedFailure
    );

    let plugged = stub
        .plug_controller(plug_request(console_id, 0, &[Port::Port1]))
        .await
        .unwrap()
        .into_inner();
    let not_ready = stub
        .start_game(StartGameRequestPb { console_id })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        not_ready.status(),
        start_game_response_pb::Status::UnspecifiedFailure
    );

    let mut stream = EventStream::open(&mut stub).await;
    stream.ready(console_id, plugged.client_id).await;
    start_when_ready(&mut stub, console_id).await;

    let start = stream.next().await.start_game.unwrap();
    assert_eq!(start.console_id, console_id);
    assert_eq!(start.connected_ports.len(), 1);
    assert_eq!(start.connected_ports[0].port(), Port::Port1);

    let again = stub
        .start_game(StartGameRequestPb { console_id })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        again.status(),
        start_game_response_pb::Status::UnspecifiedFailure
    );
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn anonymous_stream_gets_invalid_data() {
    let (_handle, mut stub) = setup(ServerConfig::local_test()).await;
    let console_id = make_console(&mut stub, "").await;
    let plugged = stub
        .plug_controller(plug_request(console_id, 0, &[Port::Port1]))
        .await
        .unwrap()
        .into_inner();

    let mut stream = EventStream::open(&mut stub).await;
    stream
        .send(OutgoingEventPb {
            key_press: vec![key(console_id, Port::Port1, 0)],
            ..Default::default()
        })
        .await;
    let reply = stream.next().await;
    assert_eq!(
        reply.invalid_data[0].status(),
        invalid_data_pb::Status::ClientNotReady
    );

    stream.ready(console_id + 1, plugged.client_id).await;
    let reply = stream.next().await;
    assert_eq!(
        reply.invalid_data[0].status(),
        invalid_data_pb::Status::InvalidConsole
    );

    stream.ready(console_id, plugged.client_id + 100).await;
    let reply = stream.next().await;
    assert_eq!(
        reply.invalid_data[0].status(),
        invalid_data_pb::Status::InvalidClient
    );

    // Still usable once a valid announcement arrives.
    stream.ready(console_id, plugged.client_id).await;
    start_when_ready(&mut stub, console_id).await;
    assert!(stream.next().await.start_game.is_some());
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn second_stream_for_bound_client_stays_anonymous() {
    let (_handle, mut stub) = setup(ServerConfig::local_test()).await;
    let console_id = make_console(&mut stub, "").await;
    let plugged = stub
        .plug_controller(plug_request(console_id, 0, &[Port::Port1]))
        .await
        .unwrap()
        .into_inner();

    let mut first = EventStream::open(&mut stub).await;
    first.ready(console_id, plugged.client_id).await;
    // Starting succeeds only once the first stream is bound.
    start_when_ready(&mut stub, console_id).await;
    assert!(first.next().await.start_game.is_some());

    let mut second = EventStream::open(&mut stub).await;
    second.ready(console_id, plugged.client_id).await;
    let reply = second.next().await;
    assert_eq!(
        reply.invalid_data[0].status(),
        invalid_data_pb::Status::InvalidClient
    );

    second
        .send(OutgoingEventPb {
            key_press: vec![key(console_id, Port::Port1, 0)],
            ..Default::default()
        })
        .await;
    let reply = second.next().await;
    assert_eq!(
        reply.invalid_data[0].status(),
        invalid_data_pb::Status::ClientNotReady
    );

    // The first binding keeps working.
    first
        .send(OutgoingEventPb {
            key_press: vec![key(console_id, Port::Port2, 0)],
            ..Default::default()
        })
        .await;
    assert_eq!(
        first.next().await.invalid_data[0].status(),
        invalid_data_pb::Status::InvalidPort
    );
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn key_presses_are_relayed() {
    let (_handle, mut stub) = setup(ServerConfig::local_test()).await;
    let console_id = make_console(&mut stub, "").await;
    let a = stub
        .plug_controller(plug_request(console_id, 1, &[Port::Port1]))
        .await
        .unwrap()
        .into_inner();
    let b = stub
        .plug_controller(plug_request(console_id, 3, &[Port::Port2]))
        .await
        .unwrap()
        .into_inner();

    let mut stream_a = EventStream::open(&mut stub).await;
    let mut stream_b = EventStream::open(&mut stub).await;
    stream_a.ready(console_id, a.client_id).await;
    stream_b.ready(console_id, b.client_id).await;
    start_when_ready(&mut stub, console_id).await;

    let layout: Vec<(Port, i32)> = stream_a
        .next()
        .await
        .start_game
        .unwrap()
        .connected_ports
        .iter()
        .map(|connected| (connected.port(), connected.delay_frames))
        .collect();
    assert_eq!(layout, vec![(Port::Port1, 1), (Port::Port2, 3)]);
    assert!(stream_b.next().await.start_game.is_some());

    stream_a
        .send(OutgoingEventPb {
            key_press: vec![key(console_id, Port::Port1, 1)],
            ..Default::default()
        })
        .await;
    let relayed = stream_b.next().await;
    assert_eq!(relayed.key_press.len(), 1);
    assert_eq!(relayed.key_press[0].frame_number, 1);
    assert_eq!(relayed.key_press[0].x_axis, 10);

    // Keys for a port the sender does not own are bounced back.
    stream_a
        .send(OutgoingEventPb {
            key_press: vec![key(console_id, Port::Port2, 2)],
            ..Default::default()
        })
        .await;
    let bounced = stream_a.next().await;
    assert_eq!(
        bounced.invalid_data[0].status(),
        invalid_data_pb::Status::InvalidPort
    );
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn shutdown_ignored_outside_test_mode() {
    let config = ServerConfig {
        test_mode: false,
        ..ServerConfig::local_test()
    };
    let (handle, mut stub) = setup(config).await;
    let response = stub
        .shut_down_server(ShutDownServerRequestPb {})
        .await
        .unwrap()
        .into_inner();
    assert!(!response.server_will_die);
    assert!(!*handle.stopped().borrow());
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn shutdown_stops_consoles() {
    let (handle, mut stub) = setup(ServerConfig::local_test()).await;
    let console_id = make_console(&mut stub, "").await;
    let plugged = stub
        .plug_controller(plug_request(console_id, 0, &[Port::Port1]))
        .await
        .unwrap()
        .into_inner();
    let mut stream = EventStream::open(&mut stub).await;
    stream.ready(console_id, plugged.client_id).await;
    start_when_ready(&mut stub, console_id).await;
    assert!(stream.next().await.start_game.is_some());

    let response = stub
        .shut_down_server(ShutDownServerRequestPb {})
        .await
        .unwrap()
        .into_inner();
    assert!(response.server_will_die);

    let stop = stream.next().await.stop_console.unwrap();
    assert_eq!(stop.console_id, console_id);
    assert!(*handle.stopped().borrow());

    drop(stream);
    drop(stub);
    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("server did not stop")
        .unwrap();
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn finished_console_frees_its_slot() {
    let config = ServerConfig {
        max_consoles: Some(1),
        ..ServerConfig::local_test()
    };
    let (_handle, mut stub) = setup(config).await;
    let console_id = make_console(&mut stub, "").await;
    let plugged = stub
        .plug_controller(plug_request(console_id, 0, &[Port::Port1]))
        .await
        .unwrap()
        .into_inner();
    let mut stream = EventStream::open(&mut stub).await;
    stream.ready(console_id, plugged.client_id).await;
    start_when_ready(&mut stub, console_id).await;
    assert!(stream.next().await.start_game.is_some());

    let full = stub
        .make_console(MakeConsoleRequestPb::default())
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        full.status(),
        make_console_response_pb::Status::UnspecifiedFailure
    );

    // The only player leaves; the console is done and gets dropped.
    drop(stream);
    let mut next = None;
    for _ in 0..100 {
        let response = stub
            .make_console(MakeConsoleRequestPb::default())
            .await
            .unwrap()
            .into_inner();
        if response.status() == make_console_response_pb::Status::Success {
            next = Some(response.console_id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(next, Some(console_id + 1));

    let stale = stub
        .plug_controller(plug_request(console_id, 0, &[Port::Port2]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        stale.status(),
        plug_controller_response_pb::Status::UnspecifiedFailure
    );
}
