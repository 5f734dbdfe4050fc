// Integration tests for the media path
//
// Drives real UDP datagrams into rooms and checks what viewers receive:
// - Timestamp rebasing at the room
// - Keyframe fast start on join
// - Continuous numbering across room switches
// - Ingress surviving malformed datagrams

use async_trait::async_trait;
use bytes::Bytes;
use relayhub_sfu::{
    MediaSink, NegotiatedSession, Negotiator, Packet, RTCSessionDescription, RecordingSink, Registry,
    Result, Room, SfuConfig, SwitchOutcome,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use webrtc::rtp::header::Header;
use webrtc::util::marshal::Marshal;

const START: [u8; 4] = [0x10, 0x9d, 0x01, 0x2a];
const MIDDLE: [u8; 4] = [0x00, 0x01, 0x02, 0x03];

// Mock negotiator handing out in-memory sinks
#[derive(Default)]
struct MockNegotiator {
    sinks: parking_lot::Mutex<Vec<Arc<RecordingSink>>>,
    close_triggers: parking_lot::Mutex<Vec<oneshot::Sender<()>>>,
}

#[async_trait]
impl Negotiator for MockNegotiator {
    async fn negotiate(&self, _offer: RTCSessionDescription) -> Result<NegotiatedSession> {
        let sink = Arc::new(RecordingSink::new());
        let (tx, rx) = oneshot::channel();
        self.sinks.lock().push(Arc::clone(&sink));
        self.close_triggers.lock().push(tx);
        Ok(NegotiatedSession {
            answer: RTCSessionDescription::default(),
            sink: sink as Arc<dyn MediaSink>,
            closed: rx,
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn datagram(sequence_number: u16, timestamp: u32, marker: bool, payload: &[u8]) -> Bytes {
    Packet {
        header: Header {
            version: 2,
            payload_type: 96,
            sequence_number,
            timestamp,
            marker,
            ssrc: 0xdead_beef,
            ..Default::default()
        },
        payload: Bytes::copy_from_slice(payload),
    }
    .marshal()
    .expect("packet should marshal")
}

struct Source {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Source {
    async fn to(room: &Room) -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.expect("bind source"),
            target: SocketAddr::from(([127, 0, 0, 1], room.port())),
        }
    }

    async fn send(&self, data: &[u8]) {
        self.socket.send_to(data, self.target).await.expect("send datagram");
    }
}

async fn wait_for_packets(sink: &RecordingSink, count: usize) -> Vec<Packet> {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let packets = sink.packets();
            if packets.len() >= count {
                return packets;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewer should receive packets")
}

async fn wait_for_received(room: &Room, count: u64) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while room.get_stats().await.packets_received < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room should receive packets");
}

fn setup() -> (Arc<Registry>, Arc<MockNegotiator>) {
    init_tracing();
    let negotiator = Arc::new(MockNegotiator::default());
    let registry = Registry::new(SfuConfig::default(), Arc::clone(&negotiator) as Arc<dyn Negotiator>);
    (registry, negotiator)
}

#[tokio::test]
async fn test_udp_ingress_to_viewer() {
    let (registry, negotiator) = setup();
    let room = registry.add_room(0).await.expect("add room");
    let session = registry.add_viewer(RTCSessionDescription::default()).await.expect("add viewer");
    registry.switch(&session.stream.id, Some(&room.id)).await.expect("switch");
    let sink = Arc::clone(&negotiator.sinks.lock()[0]);

    let source = Source::to(&room).await;
    source.send(&datagram(1000, 1000, false, &START)).await;
    source.send(&datagram(1001, 1040, false, &MIDDLE)).await;
    source.send(&datagram(1002, 1080, true, &MIDDLE)).await;

    let packets = wait_for_packets(&sink, 3).await;
    let seqs: Vec<u16> = packets.iter().map(|p| p.header.sequence_number).collect();
    let tss: Vec<u32> = packets.iter().map(|p| p.header.timestamp).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(tss, vec![0, 40, 80]);
    assert_eq!(packets[0].payload.as_ref(), &START);
}

#[tokio::test]
async fn test_late_joiner_gets_keyframe_then_live_packets() {
    let (registry, negotiator) = setup();
    let room = registry.add_room(0).await.expect("add room");
    let source = Source::to(&room).await;

    source.send(&datagram(1, 90_000, false, &START)).await;
    source.send(&datagram(2, 90_000, true, &MIDDLE)).await;
    wait_for_received(&room, 2).await;

    let session = registry.add_viewer(RTCSessionDescription::default()).await.expect("add viewer");
    registry.switch(&session.stream.id, Some(&room.id)).await.expect("switch");
    let sink = Arc::clone(&negotiator.sinks.lock()[0]);

    source.send(&datagram(3, 93_000, false, &START)).await;

    let packets = wait_for_packets(&sink, 3).await;
    let seqs: Vec<u16> = packets.iter().map(|p| p.header.sequence_number).collect();
    let tss: Vec<u32> = packets.iter().map(|p| p.header.timestamp).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(tss, vec![0, 0, 3000]);
}

#[tokio::test]
async fn test_switch_continues_numbering_across_rooms() {
    let (registry, negotiator) = setup();
    let room_a = registry.add_room(0).await.expect("add room");
    let room_b = registry.add_room(0).await.expect("add room");
    let source_a = Source::to(&room_a).await;
    let source_b = Source::to(&room_b).await;

    let session = registry.add_viewer(RTCSessionDescription::default()).await.expect("add viewer");
    let viewer_id = session.stream.id.clone();
    let sink = Arc::clone(&negotiator.sinks.lock()[0]);
    registry.switch(&viewer_id, Some(&room_a.id)).await.expect("switch");

    source_a.send(&datagram(40_000, 10_000, false, &START)).await;
    source_a.send(&datagram(40_001, 13_000, true, &MIDDLE)).await;
    let before = wait_for_packets(&sink, 2).await;
    let k = before.last().map(|p| p.header.sequence_number).expect("packets");
    let clock = before.last().map(|p| p.header.timestamp).expect("packets");

    // Room B runs on a completely different clock and sequence space
    source_b.send(&datagram(7, 4_000_000_000, false, &START)).await;
    source_b.send(&datagram(8, 4_000_003_000, true, &MIDDLE)).await;
    wait_for_received(&room_b, 2).await;

    let outcome = registry.switch(&viewer_id, Some(&room_b.id)).await.expect("switch");
    assert_eq!(outcome, SwitchOutcome::Joined(room_b.id.clone()));

    let after = wait_for_packets(&sink, 4).await;
    assert_eq!(after[2].header.sequence_number, k + 1);
    assert_eq!(after[3].header.sequence_number, k + 2);
    assert_eq!(after[2].header.timestamp, clock);
    assert_eq!(after[3].header.timestamp, clock + 3000);
}

#[tokio::test]
async fn test_garbage_datagram_does_not_kill_room() {
    let (registry, negotiator) = setup();
    let room = registry.add_room(0).await.expect("add room");
    let session = registry.add_viewer(RTCSessionDescription::default()).await.expect("add viewer");
    registry.switch(&session.stream.id, Some(&room.id)).await.expect("switch");
    let sink = Arc::clone(&negotiator.sinks.lock()[0]);

    let source = Source::to(&room).await;
    source.send(&[0x00, 0x01]).await;
    source.send(&datagram(5, 500, false, &START)).await;

    let packets = wait_for_packets(&sink, 1).await;
    assert_eq!(packets[0].header.sequence_number, 0);
}

#[tokio::test]
async fn test_viewer_close_detaches_from_room() {
    let (registry, negotiator) = setup();
    let room = registry.add_room(0).await.expect("add room");
    let session = registry.add_viewer(RTCSessionDescription::default()).await.expect("add viewer");
    let viewer_id = session.stream.id.clone();
    registry.switch(&viewer_id, Some(&room.id)).await.expect("switch");
    drop(session);

    let trigger = negotiator.close_triggers.lock().pop().expect("close trigger");
    trigger.send(()).expect("watcher listening");

    tokio::time::timeout(Duration::from_secs(3), async {
        while room.has(&viewer_id).await || registry.viewer(&viewer_id).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed viewer should be detached and evicted");

    let result = registry.switch(&viewer_id, Some(&room.id)).await;
    assert!(matches!(result, Err(relayhub_sfu::Error::ViewerNotFound(_))));
}
