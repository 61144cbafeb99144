//! Voice/video/data shaping demo.
//!
//! Reproduces the classic QoS lab setup in software: three traffic
//! classes marked by DSCP, a shared uplink, and iperf-style senders
//! offering more than the link can carry. Run it and watch the per-class
//! summary: voice stays clean, data takes the drops.
//!
//! ```sh
//! cargo run --example qos_demo
//! ```

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use classful::{
    ClassConfig, ClassId, Egress, PacketDescriptor, PolicerConfig, Protocol, Rate, RuleSet,
    Shaper, ShaperConfig,
};
use tracing::info;

const VOICE: ClassId = ClassId::new(10);
const VIDEO: ClassId = ClassId::new(20);
const DATA: ClassId = ClassId::new(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let server: IpAddr = "10.0.2.3".parse()?;

    // A 2 Mbit/s uplink. Voice is policed on top of its shaping limits so
    // a DSCP-spoofing sender can't flood the expedited class.
    let config = ShaperConfig::new(
        Rate::from_mbit_per_sec(2),
        RuleSet::dscp_policy(VOICE, VIDEO, DATA),
    )
    .with_class(
        ClassConfig::new(VOICE, Rate::from_kbit_per_sec(512), Rate::from_mbit_per_sec(2))
            .with_priority(0)
            .with_policer(PolicerConfig::new(Rate::from_kbit_per_sec(768))),
    )
    .with_class(
        ClassConfig::new(VIDEO, Rate::from_mbit_per_sec(1), Rate::from_mbit_per_sec(2))
            .with_priority(1),
    )
    .with_class(
        ClassConfig::new(DATA, Rate::from_kbit_per_sec(256), Rate::from_kbit_per_sec(256))
            .with_priority(2),
    );

    let shaper = Arc::new(Shaper::new("s1-eth1"));
    shaper.attach(config)?;

    // Synthetic senders: RTP voice, RTSP video, bulk HTTP. Together they
    // offer well over the uplink's capacity.
    let senders: [(u8, u16, u32, u64); 3] = [
        (184, 5060, 200, 3), // voice: 200 B every 3ms (~530 kbit/s)
        (160, 554, 1200, 9), // video: 1200 B every 9ms (~1.1 Mbit/s)
        (0, 80, 1400, 5),    // data: 1400 B every 5ms (~2.2 Mbit/s)
    ];
    for (tos, port, bytes, every_ms) in senders {
        let shaper = Arc::clone(&shaper);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(every_ms));
            loop {
                ticker.tick().await;
                let descriptor = PacketDescriptor::new(Protocol::Udp, server, bytes)
                    .with_ports(40000, port)
                    .with_tos(tos);
                let _ = shaper.ingress(descriptor, Bytes::new());
            }
        });
    }

    // The transmit loop: pull whatever the schedule releases, for two
    // seconds of load.
    let egress = Egress::new(Arc::clone(&shaper));
    let mut transmitted = 0u64;
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while let Ok(packet) = egress.next_packet().await {
            transmitted += u64::from(packet.descriptor().length_bytes());
        }
    })
    .await;

    info!(transmitted_bytes = transmitted, "link done transmitting");
    println!("Traffic summary for {}:", shaper.name());
    println!("{}", shaper.snapshot());
    Ok(())
}
