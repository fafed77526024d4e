//! Integration tests for decoding through a live session
//!
//! Bytes are injected through the simulated driver in arbitrary chunks and
//! checked against what the controller exposes to the renderer.

mod common;

use common::mock_helpers::{create_test_controller, encode_frames, test_settings};
use proptest::prelude::*;
use serial_oscope::backend::FrameFormatKind;
use serial_oscope::config::AcquisitionConfig;
use serial_oscope::types::PortId;

#[test]
fn test_raw_f32_format_from_config() {
    let (controller, _status, driver) = create_test_controller(
        &["COM3"],
        AcquisitionConfig {
            frame_format: FrameFormatKind::RawF32 { frame_size: 6 },
            ..test_settings()
        },
    );
    controller.select_port("COM3");

    let mut bytes = Vec::new();
    for v in [0.5f32, -1.5] {
        bytes.extend_from_slice(&v.to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0xFF]);
    }
    // Half of a third frame stays pending
    bytes.extend_from_slice(&[0, 0, 0]);
    driver.inject_bytes(&PortId::from("COM3"), &bytes);

    let values: Vec<f64> = controller.current_samples().iter().map(|s| s.value).collect();
    assert_eq!(values, vec![0.5, -1.5]);
    assert_eq!(controller.stats().bytes, 15);
}

#[test]
fn test_partial_frame_does_not_leak_into_next_session() {
    let (controller, _status, driver) = create_test_controller(&["COM3"], test_settings());
    let port = PortId::from("COM3");
    let frame = encode_frames(&[4.0]);

    controller.select_port("COM3");
    driver.inject_bytes(&port, &frame[..6]);
    controller.select_port("COM3");
    driver.inject_bytes(&port, &frame[6..]);
    assert!(controller.current_samples().is_empty());

    // The stray tail and six filler bytes form one discarded frame
    driver.inject_bytes(&port, &[0u8; 6]);
    assert_eq!(controller.stats().decode_errors, 1);

    driver.inject_bytes(&port, &frame);
    assert_eq!(controller.current_samples().len(), 1);
    assert_eq!(controller.current_samples()[0].tick, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_any_chunking_yields_same_samples(
        values in prop::collection::vec(-100.0f32..100.0, 1..20),
        cuts in prop::collection::vec(1usize..15, 0..40)
    ) {
        let (controller, _status, driver) = create_test_controller(&["COM3"], test_settings());
        let port = PortId::from("COM3");
        controller.select_port("COM3");

        let bytes = encode_frames(&values);
        let mut rest = &bytes[..];
        let mut cuts = cuts.into_iter();
        while !rest.is_empty() {
            let take = cuts.next().unwrap_or(rest.len()).min(rest.len());
            let (chunk, tail) = rest.split_at(take);
            driver.inject_bytes(&port, chunk);
            rest = tail;
        }

        let decoded: Vec<f64> = controller.current_samples().iter().map(|s| s.value).collect();
        let expected: Vec<f64> = values.iter().map(|v| *v as f64).collect();
        prop_assert_eq!(decoded, expected);
        prop_assert_eq!(controller.stats().decode_errors, 0);
    }
}
