// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests over real launches.
#![cfg(unix)]

use proptest::prelude::*;
use xh_exec::{output, with_args, with_env_kv};

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn echo_round_trips_arguments(
        args in prop::collection::vec("[a-zA-Z0-9][a-zA-Z0-9_.]{0,11}", 1..6)
    ) {
        let out = block_on(output("echo", [with_args(args.clone())])).unwrap();
        prop_assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", args.join(" ")));
    }

    #[test]
    fn repeated_key_prints_once_with_last_value(
        values in prop::collection::vec("[a-z0-9]{1,8}", 1..5)
    ) {
        let options: Vec<_> = values
            .iter()
            .map(|v| with_env_kv(["XH_PROP_KEY", v.as_str()]))
            .collect();
        let out = block_on(output("printenv", options)).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().filter(|l| l.starts_with("XH_PROP_KEY=")).collect();
        let expected = format!("XH_PROP_KEY={}", values.last().unwrap());
        prop_assert_eq!(lines, vec![expected.as_str()]);
    }
}
