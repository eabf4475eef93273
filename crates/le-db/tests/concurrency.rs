//! Concurrent writers on one database file, each with its own connection.

use std::sync::{Arc, Barrier};
use std::thread;

use le_core::{Fold, LectureId};
use le_db::Database;

const WRITERS: usize = 8;
const EVENTS_PER_WRITER: usize = 25;

fn score_for(writer: usize, event: usize) -> f64 {
    #[expect(clippy::cast_precision_loss, reason = "small test indices")]
    let score = ((writer * 31 + event * 17) % 101) as f64;
    score
}

#[test]
fn concurrent_folds_are_never_lost() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("analytics.db");
    Database::open(&path).expect("initialize schema");

    let lecture = LectureId::new("concurrency-101").expect("valid id");
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = path.clone();
            let lecture = lecture.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut db = Database::open(&path).expect("open per-writer connection");
                barrier.wait();
                for event in 0..EVENTS_PER_WRITER {
                    db.fold(&lecture, &Fold::View).expect("view fold");
                    db.fold(
                        &lecture,
                        &Fold::WatchTime {
                            seconds: 1,
                            duration: None,
                        },
                    )
                    .expect("watch fold");
                    db.fold(
                        &lecture,
                        &Fold::Attention {
                            second: 7,
                            score: score_for(writer, event),
                        },
                    )
                    .expect("attention fold");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let total = WRITERS * EVENTS_PER_WRITER;
    let record = Database::open(&path)
        .expect("reopen")
        .read(&lecture)
        .expect("read");
    assert_eq!(record.total_views, total as u64);
    assert_eq!(record.total_watch_time_sec, total as u64);

    let point = record.attention_timeline[&7];
    assert_eq!(point.samples, total as u64);

    let sum: f64 = (0..WRITERS)
        .flat_map(|writer| (0..EVENTS_PER_WRITER).map(move |event| score_for(writer, event)))
        .sum();
    #[expect(clippy::cast_precision_loss, reason = "small test counts")]
    let mean = sum / total as f64;
    assert!(
        (point.avg_score - mean).abs() < 1e-6,
        "running mean {} drifted from arithmetic mean {mean}",
        point.avg_score
    );
}

#[test]
fn readers_never_observe_partial_folds() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("analytics.db");
    Database::open(&path).expect("initialize schema");
    let lecture = LectureId::new("snapshot").expect("valid id");

    let writer = {
        let path = path.clone();
        let lecture = lecture.clone();
        thread::spawn(move || {
            let mut db = Database::open(&path).expect("open writer");
            for _ in 0..200 {
                db.fold(
                    &lecture,
                    &Fold::Attention {
                        second: 0,
                        score: 100.0,
                    },
                )
                .expect("attention fold");
            }
        })
    };

    let reader = Database::open(&path).expect("open reader");
    let mut last_samples = 0;
    for _ in 0..200 {
        let record = reader.read(&lecture).expect("read");
        if let Some(point) = record.attention_timeline.get(&0) {
            assert!(point.samples >= last_samples, "samples went backwards");
            assert!((point.avg_score - 100.0).abs() < 1e-9);
            last_samples = point.samples;
        }
    }
    writer.join().expect("writer thread");
    assert_eq!(
        reader.read(&lecture).expect("read").attention_timeline[&0].samples,
        200
    );
}
