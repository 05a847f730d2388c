mod common;

use std::sync::Arc;
use std::thread;

use common::*;
use tern_runtime::{Config, ParamPassing};

#[test]
fn threads_share_one_machine() {
    let vm = Arc::new(vm(config(ParamPassing::Register, true, 2), library()));
    vm.generate_all_code();
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let vm = Arc::clone(&vm);
            thread::spawn(move || {
                let n = 10 + t % 4;
                (n, run_int(&vm, "fib", &[n]), run_int(&vm, "sum_to", &[n]))
            })
        })
        .collect();
    for h in handles {
        let (n, f, s) = h.join().unwrap();
        assert_eq!(f, fib(n));
        assert_eq!(s, n * (n + 1) / 2);
    }
}

#[test]
fn compilation_can_race_with_execution() {
    for cfg in [
        config(ParamPassing::Stack, false, 0),
        config(ParamPassing::Register, true, 1),
        Config::interpreter_only(),
    ] {
        let vm = Arc::new(vm(cfg, library()));
        let runners: Vec<_> = (0..4)
            .map(|_| {
                let vm = Arc::clone(&vm);
                thread::spawn(move || {
                    (0..20)
                        .map(|i| run_int(&vm, "fib", &[i % 12]))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let compiler = {
            let vm = Arc::clone(&vm);
            thread::spawn(move || vm.generate_all_code())
        };
        compiler.join().unwrap();
        for r in runners {
            let results = r.join().unwrap();
            for (i, got) in results.into_iter().enumerate() {
                assert_eq!(got, fib(i as i64 % 12));
            }
        }
    }
}
