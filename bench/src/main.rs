use bustle::{Collection, Mix, Workload};

mod adapters;
use adapters::{RwLockStdHashMapTable, StripedTable};

// Neither table supports removal, so every mix leaves it out.
fn mixes() -> [(&'static str, Mix); 2] {
    [
        (
            "read-heavy",
            Mix {
                read: 95,
                insert: 5,
                remove: 0,
                update: 0,
                upsert: 0,
            },
        ),
        (
            "insert-heavy",
            Mix {
                read: 20,
                insert: 80,
                remove: 0,
                update: 0,
                upsert: 0,
            },
        ),
    ]
}

fn run<C: Collection>(name: &str)
where
    <C::Handle as bustle::CollectionHandle>::Key: Send + std::fmt::Debug,
{
    for (mix_name, mix) in mixes() {
        for threads in (1..=num_cpus::get()).filter(|n| n.is_power_of_two()) {
            let measurement = Workload::new(threads, mix)
                .initial_capacity_log2(16)
                .prefill_fraction(0.5)
                .operations(0.5)
                .run_silently::<C>();

            println!(
                "{name:>12} {mix_name:>12} threads={threads:<3} {:?}/op",
                measurement.latency
            );
        }
    }
}

fn main() {
    run::<StripedTable>("striped");
    run::<RwLockStdHashMapTable>("std");
}
