//! Regression tests synthesized by autotest from tests/fixtures/replay_trace.csv.
//! Regenerate from the trace instead of editing by hand.
#![allow(unused_imports)]

mod support;

use autotest::harness::{
    expect_equals, expect_null_or_absent, expect_throws, recorded_value, recorded_values,
    ReplayMock,
};

/// m.js,outer,
#[test]
fn outer_m_30_row1() {
    let module = support::load_module("m.js");
    let replay = ReplayMock::new("rand", recorded_values(r#"[0.25,0.5]"#));
    module
        .substitute("rand", replay.into_fn())
        .expect("rand is defined in m.js");
    let args = recorded_values(r#"[]"#);
    let expected = recorded_value(r#"0.75"#);
    expect_equals(module.call("outer", &args), &expected, "m.js,outer,");
}

/// m.js,add,2,3
#[test]
fn add_m_3_row2() {
    let module = support::load_module("m.js");
    let args = recorded_values(r#"[2,3]"#);
    let expected = recorded_value(r#"5"#);
    expect_equals(module.call("add", &args), &expected, "m.js,add,2,3");
}

/// m.js,fail,"x"
#[test]
fn fail_m_9_row3() {
    let module = support::load_module("m.js");
    let args = recorded_values(r#"["x"]"#);
    expect_throws(module.call("fail", &args), "m.js,fail,\"x\"");
}

/// m.js,log,"hi"
#[test]
fn log_m_12_row4() {
    let module = support::load_module("m.js");
    let args = recorded_values(r#"["hi"]"#);
    expect_null_or_absent(module.call("log", &args), "m.js,log,\"hi\"");
}

/// m.js,inv,0
#[test]
fn inv_m_15_row5() {
    let module = support::load_module("m.js");
    let args = recorded_values(r#"[0]"#);
    let expected = recorded_value(r#""Infinity""#);
    expect_equals(module.call("inv", &args), &expected, "m.js,inv,0");
}
