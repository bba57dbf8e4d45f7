//! Parametrized coverage of `Message`'s primitive-value accessors.

use rstest::rstest;
use stagelooper::{HandlerId, Message};

#[rstest]
#[case::true_value(true)]
#[case::false_value(false)]
fn bool_round_trip(#[case] value: bool) {
    let msg = Message::new(HandlerId::new(1));
    msg.set_bool("flag", value);
    assert_eq!(msg.find_bool("flag"), Some(value));
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(-1)]
#[case(i32::MIN)]
#[case(i32::MAX)]
fn int32_round_trip(#[case] value: i32) {
    let msg = Message::new(HandlerId::new(1));
    msg.set_int32("n", value);
    assert_eq!(msg.find_int32("n"), Some(value));
}

#[rstest]
#[case(0)]
#[case(i64::MIN)]
#[case(i64::MAX)]
fn int64_round_trip(#[case] value: i64) {
    let msg = Message::new(HandlerId::new(1));
    msg.set_int64("n", value);
    assert_eq!(msg.find_int64("n"), Some(value));
}

#[rstest]
#[case(0)]
#[case(usize::MAX)]
fn size_round_trip(#[case] value: usize) {
    let msg = Message::new(HandlerId::new(1));
    msg.set_size("n", value);
    assert_eq!(msg.find_size("n"), Some(value));
}

#[rstest]
#[case(0.0)]
#[case(-1.5)]
#[case(f32::MAX)]
fn float_round_trip(#[case] value: f32) {
    let msg = Message::new(HandlerId::new(1));
    msg.set_float("n", value);
    assert_eq!(msg.find_float("n"), Some(value));
}

#[rstest]
#[case(0.0)]
#[case(-1.5)]
#[case(f64::MAX)]
fn double_round_trip(#[case] value: f64) {
    let msg = Message::new(HandlerId::new(1));
    msg.set_double("n", value);
    assert_eq!(msg.find_double("n"), Some(value));
}

#[rstest]
#[case::int32_as_int64(1_i32)]
fn mismatched_type_lookup_returns_none(#[case] value: i32) {
    let msg = Message::new(HandlerId::new(1));
    msg.set_int32("n", value);
    assert_eq!(msg.find_int64("n"), None);
    assert_eq!(msg.find_bool("n"), None);
    assert_eq!(msg.find_string("n"), None);
}
