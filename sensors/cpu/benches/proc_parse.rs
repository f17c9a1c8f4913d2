//! Benchmarks for the procfs record parsers and top-N selection.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fanwhy_cpu::{top_n, CpuCounters, ProcessUsage, StatRecord};

const PROC_STAT_LINE: &str = "cpu  4705 356 584 3699176 23060 0 277 0 0 0";
const PID_STAT: &str = "2048 (Web Content (x)) S 1 2048 2048 0 -1 4194560 51234 0 12 0 \
                        9876 1234 0 0 20 0 31 0 4567 2147483648 98304 18446744073709551615";

fn bench_proc_stat_line(c: &mut Criterion) {
    c.bench_function("parse_proc_stat_line", |b| {
        b.iter(|| CpuCounters::parse_from_proc_stat_line(black_box(PROC_STAT_LINE)))
    });
}

fn bench_pid_stat(c: &mut Criterion) {
    c.bench_function("parse_pid_stat", |b| b.iter(|| StatRecord::parse(black_box(PID_STAT))));
}

fn bench_top_n(c: &mut Criterion) {
    let usages: Vec<ProcessUsage> = (0..2000_u32)
        .map(|pid| ProcessUsage {
            pid,
            name: format!("proc{pid}"),
            user: "root".to_owned(),
            cpu_percent: f64::from((pid * 7919) % 1000) / 10.0,
        })
        .collect();

    c.bench_function("top_n_2000", |b| b.iter(|| top_n(black_box(usages.clone()), 5)));
}

criterion_group!(benches, bench_proc_stat_line, bench_pid_stat, bench_top_n);
criterion_main!(benches);
