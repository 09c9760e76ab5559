//! Hand-instrumented program showing where the rewriting tool puts each hook.
//!
//! Run with:
//! cargo run -p counterscope-runtime --example nested -- -trace-events=cycles,instructions -output-file=nested.csv

use counterscope_runtime::{OrAbort, PerfCounters, Runtime};

type Rt = Runtime<PerfCounters>;

fn checksum(rt: &mut Rt, data: &[u8]) -> u64 {
    rt.on_entry("checksum").or_abort();
    let mut acc = 0u64;
    for &b in data {
        acc = acc.wrapping_mul(31).wrapping_add(u64::from(b));
    }
    rt.on_exit("checksum").or_abort();
    acc
}

fn fib(rt: &mut Rt, n: u32) -> u64 {
    rt.on_entry("fib").or_abort();
    if n < 2 {
        rt.on_exit("fib").or_abort();
        return u64::from(n);
    }
    let value = fib(rt, n - 1) + fib(rt, n - 2);
    rt.on_exit("fib").or_abort();
    value
}

fn work(rt: &mut Rt) -> u64 {
    rt.on_entry("work").or_abort();
    let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let sum = checksum(rt, &data) ^ fib(rt, 12);
    // Fallthrough exit synthesized at the end of the body.
    rt.on_exit("work").or_abort();
    sum
}

fn main() {
    env_logger::init();
    let mut rt = Runtime::from_args(std::env::args()).or_abort();

    let result = work(&mut rt);
    println!("result: {result}");

    let summary = rt.finalize().or_abort();
    println!("rows written: {}", summary.rows);
}
