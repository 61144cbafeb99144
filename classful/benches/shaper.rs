use bytes::Bytes;
use classful::{
    ClassConfig, ClassId, PacketDescriptor, Protocol, Rate, RuleSet, Shaper, ShaperConfig,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const VOICE: ClassId = ClassId::new(10);
const VIDEO: ClassId = ClassId::new(20);
const DATA: ClassId = ClassId::new(30);
const UNKNOWN: ClassId = ClassId::new(40);

fn attach_shaper() -> Shaper {
    // A fast link so the bench measures engine overhead, not token waits.
    let link = Rate::from_mbit_per_sec(10_000);
    let config =
        ShaperConfig::new(link, RuleSet::port_policy(VOICE, VIDEO, DATA, UNKNOWN))
            .with_class(ClassConfig::new(VOICE, Rate::from_mbit_per_sec(1_000), link))
            .with_class(ClassConfig::new(VIDEO, Rate::from_mbit_per_sec(2_000), link))
            .with_class(ClassConfig::new(DATA, Rate::from_mbit_per_sec(4_000), link))
            .with_class(ClassConfig::new(UNKNOWN, Rate::from_mbit_per_sec(1_000), link));
    let shaper = Shaper::new("bench0");
    shaper.attach(config).unwrap();
    shaper
}

fn bench_ingress_dequeue(c: &mut Criterion) {
    let shaper = attach_shaper();
    let mut rng = StdRng::seed_from_u64(7);
    let ports: [u16; 4] = [5060, 554, 443, 9999];

    let mut group = c.benchmark_group("shaper");
    group.throughput(Throughput::Elements(1));
    group.bench_function("ingress_dequeue", |b| {
        b.iter(|| {
            let bytes = rng.gen_range(64..1500u32);
            let port = ports[rng.gen_range(0..ports.len())];
            let descriptor =
                PacketDescriptor::new(Protocol::Udp, "10.0.2.3".parse().unwrap(), bytes)
                    .with_ports(40000, port);
            shaper.ingress(descriptor, Bytes::new()).unwrap();
            shaper.dequeue_next().unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_ingress_dequeue);
criterion_main!(benches);
