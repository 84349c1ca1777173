// Shared-primitive benchmarks.
//
// Covers address derivation (vault ids are derived on every create), hex
// round trips, and the in-memory asset ledger's allowance-checked pull.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use poolvault_protocol::config::VAULT_ADDRESS_DOMAIN;
use poolvault_protocol::{Address, AssetLedger, InMemoryAssetLedger};

fn bench_derive(c: &mut Criterion) {
    let controller = Address::from_label("controller");
    let creator = Address::from_label("creator");

    c.bench_function("address/derive_vault", |b| {
        b.iter(|| {
            Address::derive(
                VAULT_ADDRESS_DOMAIN,
                &[
                    controller.as_bytes(),
                    creator.as_bytes(),
                    &42u64.to_le_bytes(),
                ],
            )
        });
    });
}

fn bench_hex(c: &mut Criterion) {
    let addr = Address::from_label("alice");
    let text = addr.to_hex();

    c.bench_function("address/to_hex", |b| b.iter(|| addr.to_hex()));
    c.bench_function("address/parse", |b| {
        b.iter(|| text.parse::<Address>().unwrap())
    });
}

fn bench_transfer_from(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/transfer_from");

    for holders in [10usize, 1_000, 100_000] {
        let ledger = InMemoryAssetLedger::new();
        let asset = Address::from_label("tusdt");
        ledger.register_asset(asset);
        for i in 0..holders {
            ledger
                .mint(&asset, &Address::from_label(&format!("h{i}")), 1)
                .unwrap();
        }
        let alice = Address::from_label("alice");
        let pool = Address::from_label("pool");
        ledger.mint(&asset, &alice, u64::MAX / 2).unwrap();
        ledger.approve(&asset, &alice, &pool, u64::MAX / 2).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(holders), &holders, |b, _| {
            b.iter(|| ledger.transfer_from(&asset, &pool, &alice, &pool, 1).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_derive, bench_hex, bench_transfer_from);
criterion_main!(benches);
