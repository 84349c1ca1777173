// Vault accounting benchmarks.
//
// Covers the deposit quote, full deposit/redeem round trips through the
// controller, and vault creation as the per-creator registry grows.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use poolvault_contracts::{Controller, VaultParams};
use poolvault_protocol::{Address, InMemoryAssetLedger};

fn params(asset: Address) -> VaultParams {
    VaultParams {
        asset,
        name: "Bench".into(),
        symbol: "BV".into(),
        share_pool_ratio: 90,
        share_dilute_ratio: 90,
    }
}

fn deployment() -> (Controller, Arc<InMemoryAssetLedger>, Address, Address) {
    let ledger = Arc::new(InMemoryAssetLedger::new());
    let asset = Address::from_label("tusdt");
    ledger.register_asset(asset);
    let controller = Controller::new(ledger.clone());
    let vault = controller
        .create_vault(&Address::from_label("creator"), params(asset))
        .unwrap();
    (controller, ledger, asset, vault)
}

fn bench_preview_deposit(c: &mut Criterion) {
    let (controller, ledger, asset, vault) = deployment();
    let alice = Address::from_label("alice");
    ledger.mint(&asset, &alice, 10_000_000).unwrap();
    ledger.approve(&asset, &alice, &vault, 10_000_000).unwrap();
    controller.deposit(&alice, &vault, 10_000_000, &alice).unwrap();

    c.bench_function("vault/preview_deposit", |b| {
        b.iter(|| controller.preview_deposit(&vault, 1_234_567).unwrap());
    });
}

fn bench_deposit_redeem(c: &mut Criterion) {
    let (controller, ledger, asset, vault) = deployment();
    let alice = Address::from_label("alice");
    ledger.mint(&asset, &alice, u64::MAX / 2).unwrap();
    ledger.approve(&asset, &alice, &vault, u64::MAX / 2).unwrap();

    c.bench_function("vault/deposit_then_redeem", |b| {
        b.iter(|| {
            let shares = controller.deposit(&alice, &vault, 1_000_000, &alice).unwrap();
            let out = controller.redeem(&alice, &vault, shares, &alice, &alice).unwrap();
            // Keep the event log from growing across millions of iterations.
            controller.events().drain();
            out
        });
    });
}

fn bench_create_vault(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller/create_vault");

    for existing in [0usize, 100, 1_000] {
        let (controller, _, asset, _) = deployment();
        let creator = Address::from_label("busy-creator");
        for _ in 0..existing {
            controller.create_vault(&creator, params(asset)).unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(existing),
            &existing,
            |b, _| {
                b.iter(|| controller.create_vault(&creator, params(asset)).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_preview_deposit,
    bench_deposit_redeem,
    bench_create_vault
);
criterion_main!(benches);
