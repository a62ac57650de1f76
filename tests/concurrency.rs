use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use striped_htable::{Error, Table};

#[test]
fn disjoint_inserts_are_not_lost() {
    let threads = 8;
    let per_thread = 2_000;

    let table = Arc::new(Table::builder().capacity(16).stripes(8).build());
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    table.insert(format!("t{t}:{i}"), (t, i)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.len(), threads * per_thread);
    assert!(table.size() > 17);

    for t in 0..threads {
        for i in 0..per_thread {
            assert_eq!(table.lookup(&format!("t{t}:{i}")), Some((t, i)));
        }
    }
}

#[test]
fn lookups_during_resizes() {
    let table = Table::builder()
        .capacity(2)
        .stripes(4)
        .collision_threshold(2)
        .build();

    for i in 0..100 {
        table.insert(format!("seed{i}"), i).unwrap();
    }

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..5_000 {
                table.insert(format!("grow{i}"), i).unwrap();
            }
        });

        for _ in 0..4 {
            s.spawn(|| {
                for round in 0..20 {
                    for i in 0..100 {
                        assert_eq!(table.lookup(&format!("seed{i}")), Some(i));
                    }
                    assert_eq!(table.lookup(&format!("absent{round}")), None);
                }
            });
        }
    });

    assert_eq!(table.len(), 5_100);
}

#[test]
fn racing_duplicates_insert_once() {
    let threads = 6;
    let table = Table::builder().capacity(4).stripes(2).build();
    let barrier = Barrier::new(threads);

    let wins: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let table = &table;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    (0..500)
                        .filter(|i| match table.insert(format!("shared{i}"), t) {
                            Ok(()) => true,
                            Err(Error::DuplicateKey { .. }) => false,
                            Err(e) => panic!("unexpected error: {e}"),
                        })
                        .count()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(wins, 500);
    assert_eq!(table.len(), 500);
}

#[test]
fn timeouts_never_corrupt() {
    let table = Table::builder()
        .capacity(2)
        .stripes(1)
        .collision_threshold(2)
        .lock_timeout(Some(Duration::from_micros(50)))
        .build();

    let inserted: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let table = &table;
                s.spawn(move || {
                    let mut inserted = 0;
                    for i in 0..300 {
                        match table.insert(format!("{t}-{i}"), i) {
                            Ok(()) => inserted += 1,
                            Err(Error::LockTimeout(_)) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                        let _ = table.try_lookup(&format!("{t}-{i}"));
                    }
                    inserted
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(table.len(), inserted);
    assert_eq!(table.waiter_count(), 0);
}
