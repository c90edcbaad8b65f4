use boxbox::analysis::{align_laps, all_pit_stops, all_stints, split_segments};
use boxbox::session::{Lap, LapTelemetry, LoadOptions, TelemetrySample};
use boxbox::{Compound, Session, SessionKey, SessionKind};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

// ~4 Hz car data over a 5.4 km lap
fn create_sample_trace(driver: &str, offset: f64) -> LapTelemetry {
    let samples = (0..1400)
        .map(|i| {
            let distance_m = i as f64 * 3.9 + offset;
            TelemetrySample {
                distance_m,
                time_s: i as f64 * 0.066,
                speed_kph: 220. + 80. * (distance_m / 400.).sin(),
                throttle: if i % 40 < 30 { 100. } else { 0. },
                brake: if i % 40 >= 34 { 100. } else { 0. },
                gear: (3 + i % 6) as u8,
                rpm: 10500.,
                drs_open: i % 200 < 20,
                x: Some((distance_m / 860.).cos() * 860.),
                y: Some((distance_m / 860.).sin() * 860.),
            }
        })
        .collect();
    LapTelemetry {
        driver: driver.to_string(),
        lap_number: 1,
        samples,
    }
}

fn create_sample_race() -> Session {
    let compounds = [Compound::Medium, Compound::Hard, Compound::Soft];
    let mut laps = Vec::new();
    for d in 0..20 {
        for n in 1..=57u32 {
            let stint = (n as usize - 1) / 20;
            laps.push(Lap {
                driver: format!("D{:02}", d),
                lap_number: n,
                lap_time_s: Some(95. + d as f64 * 0.05 + (n % 20) as f64 * 0.04),
                compound: compounds[stint],
                stint: stint as u32 + 1,
                ..Default::default()
            });
        }
    }
    Session::new(
        SessionKey::new(2024, "Bahrain Grand Prix", SessionKind::Race),
        LoadOptions::laps_only(),
        Vec::new(),
        laps,
        Vec::new(),
        Vec::new(),
    )
    .unwrap()
}

fn bench_alignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_alignment");

    let a = create_sample_trace("VER", 0.);
    let b = create_sample_trace("LEC", 1.7);

    group.bench_function("align_two_laps_2000_points", |bench| {
        bench.iter(|| black_box(align_laps(black_box(&[&a, &b]), 2000).unwrap()));
    });

    let aligned = align_laps(&[&a, &b], 2000).unwrap();
    let delta: Vec<f64> = aligned.laps[0]
        .speed_kph
        .iter()
        .zip(&aligned.laps[1].speed_kph)
        .map(|(sa, sb)| sa - sb)
        .collect();
    group.bench_function("split_speed_segments", |bench| {
        bench.iter(|| black_box(split_segments(&aligned.distance_m, black_box(&delta), 0.1)));
    });

    group.finish();
}

fn bench_strategy(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy");

    let session = create_sample_race();

    group.bench_function("segment_stints_full_race", |b| {
        b.iter(|| black_box(all_stints(black_box(&session))));
    });

    group.bench_function("pit_stops_full_race", |b| {
        b.iter(|| black_box(all_pit_stops(black_box(&session))));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = bench_alignment, bench_strategy
}
criterion_main!(benches);
