//! Integration tests for the reassembly engine
//!
//! The fixtures model a small MESA-ESS outstation: a charge/discharge
//! function of plain analog writes, a support-gated curve function built
//! from a selector block and a point array, and a loosely-ordered ramp
//! function for the ordering rules.

use mesa_engine::{
    CommandPhase, ControlCode, IngestOutcome, Instruction, OperateType, PointWriteValue,
    ProtocolError, ReassemblyEngine,
};
use mesa_model::{FunctionCatalog, PointCatalog, PointType};
use serde_json::json;
use std::sync::Arc;

const POINTS_JSON: &str = r#"
// Charge/discharge, curve and ramp points
[
    {"name": "DCHA.WinTms", "group": 41, "variation": 2, "index": 91},
    {"name": "DCHA.RmpTms", "group": 41, "variation": 2, "index": 92},
    {"name": "DCHA.RevtTms", "group": 41, "variation": 2, "index": 93},
    {"name": "DCHA.WinTms.in", "group": 30, "variation": 2, "index": 91},
    {"name": "DCHA.ModEna", "group": 12, "variation": 1, "index": 5},
    {"name": "Standalone", "group": 41, "variation": 2, "index": 150},
    {"name": "Ramp.A", "group": 41, "variation": 2, "index": 160},
    {"name": "Ramp.B", "group": 41, "variation": 2, "index": 161},
    {"name": "Ramp.C", "group": 41, "variation": 2, "index": 162},
    {"name": "Curve.In", "group": 30, "variation": 2, "index": 200},
    {"name": "Curve.supported", "group": 1, "variation": 1, "index": 10},
    {"name": "Curve.MaxPts", "group": 41, "variation": 2, "index": 430},
    {
        "name": "CurveStart-X", "type": "array",
        "group": 41, "variation": 1, "index": 207,
        "array_times_repeated": 100,
        "array_points": [{"name": "CurveStart-X"}, {"name": "CurveStart-Y"}]
    },
    {
        "name": "Curve.Edit", "type": "selector_block",
        "group": 41, "variation": 2, "index": 191,
        "selector_block_start": 191, "selector_block_end": 442,
        "save_on_write": true
    }
]
"#;

const FUNCTIONS_YAML: &str = r#"
functions:
  - id: charge_discharge
    name: charge_discharge
    steps:
      - step_number: 1
        point_name: DCHA.WinTms
        optional: M
        fcodes: [direct_operate]
        response: DCHA.WinTms.in
        action: echo
      - step_number: 2
        point_name: DCHA.RmpTms
        optional: M
        action: publish
      - step_number: 3
        point_name: DCHA.RevtTms
        optional: O
  - id: curve
    name: curve
    support_point: Curve.supported
    steps:
      - step_number: 1
        point_name: Curve.Edit
        optional: M
      - step_number: 2
        point_name: CurveStart-X
        optional: M
        action: publish_and_respond
        response: Curve.In
  - id: ramp
    name: ramp
    steps:
      - step_number: 1
        point_name: Ramp.A
        optional: O
      - step_number: 2
        point_name: Ramp.B
        optional: C
      - step_number: 3
        point_name: Ramp.C
        optional: M
"#;

fn engine() -> ReassemblyEngine {
    let points = Arc::new(PointCatalog::from_json_str(POINTS_JSON).unwrap());
    let functions = Arc::new(FunctionCatalog::from_yaml_str(FUNCTIONS_YAML).unwrap());
    functions.validate_points(&points).unwrap();
    ReassemblyEngine::new(points, functions)
}

/// Direct-operate an analog write, the common case in these scenarios.
fn dop(
    engine: &mut ReassemblyEngine,
    index: u16,
    value: f64,
) -> Result<IngestOutcome, ProtocolError> {
    engine.ingest(
        CommandPhase::DirectOperate,
        index,
        PointWriteValue::Analog(value),
        Some(OperateType::DirectOperate),
    )
}

fn curve_engine() -> ReassemblyEngine {
    let mut engine = engine();
    engine
        .update_input_point("Curve.supported", &json!(true))
        .unwrap();
    engine
}

#[test]
fn charge_discharge_reassembles_with_echo_and_publish() {
    let mut engine = engine();

    let outcome = dop(&mut engine, 91, 180.0).unwrap();
    let IngestOutcome::StepAccepted {
        function,
        step_number,
        complete,
        instructions,
    } = outcome
    else {
        panic!("step 1 not accepted");
    };
    assert_eq!(function, "charge_discharge");
    assert_eq!(step_number, 1);
    assert!(!complete);
    let [Instruction::Echo { point, updates }] = instructions.as_slice() else {
        panic!("expected a single echo, got {:?}", instructions);
    };
    assert_eq!(point, "DCHA.WinTms.in");
    assert_eq!(updates[0].index, 91);
    assert_eq!(updates[0].value, PointWriteValue::Analog(180.0));

    let outcome = dop(&mut engine, 92, 120.0).unwrap();
    let IngestOutcome::StepAccepted {
        complete,
        instructions,
        ..
    } = outcome
    else {
        panic!("step 2 not accepted");
    };
    assert!(complete);
    let [Instruction::Publish(message)] = instructions.as_slice() else {
        panic!("expected a single publish, got {:?}", instructions);
    };
    assert_eq!(message.function_name, "charge_discharge");
    assert_eq!(message.points["DCHA.WinTms"], json!(180.0));
    assert_eq!(message.points["DCHA.RmpTms"], json!(120.0));
    assert!(message.expected_response.is_none());

    // The optional tail step still lands on the complete function.
    let outcome = dop(&mut engine, 93, 60.0).unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::StepAccepted {
            step_number: 3,
            complete: true,
            ..
        }
    ));
}

#[test]
fn mandatory_step_must_precede_later_steps() {
    let mut engine = engine();
    let err = dop(&mut engine, 92, 120.0).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MissingMandatoryStep { step_number: 1, .. }
    ));
    // The rejected write was discarded from the latest-value cache.
    assert!(engine
        .latest_values()
        .get(PointType::AnalogOutput, 92)
        .is_none());
}

#[test]
fn skipping_a_mandatory_step_is_rejected() {
    let mut engine = engine();
    dop(&mut engine, 91, 180.0).unwrap();
    let err = dop(&mut engine, 93, 60.0).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MissingMandatoryStep { step_number: 2, .. }
    ));
}

#[test]
fn duplicate_step_rejected() {
    let mut engine = engine();
    dop(&mut engine, 91, 180.0).unwrap();
    let err = dop(&mut engine, 91, 181.0).unwrap_err();
    assert!(matches!(err, ProtocolError::DuplicateStep { step_number: 1 }));
    // The in-flight function survives a duplicate.
    dop(&mut engine, 92, 120.0).unwrap();
    assert!(engine.current_function().unwrap().complete());
}

#[test]
fn completeness_ignores_optional_and_conditional_steps() {
    // Only the mandatory step is needed.
    let mut engine = engine();
    let outcome = dop(&mut engine, 162, 5.0).unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::StepAccepted {
            step_number: 3,
            complete: true,
            ..
        }
    ));

    // A conditional step received on the way still lands, and the function
    // stays incomplete until the mandatory one arrives.
    let mut engine = self::engine();
    let outcome = dop(&mut engine, 161, 1.0).unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::StepAccepted {
            step_number: 2,
            complete: false,
            ..
        }
    ));
    dop(&mut engine, 162, 5.0).unwrap();
    let instance = engine.current_function().unwrap();
    assert!(instance.complete());
    assert_eq!(instance.steps().len(), 2);
}

#[test]
fn earlier_step_while_incomplete_is_out_of_order() {
    let mut engine = engine();
    dop(&mut engine, 161, 1.0).unwrap(); // ramp step 2, conditional
    let err = dop(&mut engine, 160, 2.0).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::StepOutOfOrder {
            step_number: 1,
            last_step_number: 2,
        }
    ));
}

#[test]
fn earlier_step_after_completion_restarts_the_function() {
    let mut engine = engine();
    dop(&mut engine, 91, 180.0).unwrap();
    dop(&mut engine, 92, 120.0).unwrap();
    assert!(engine.current_function().unwrap().complete());

    let outcome = dop(&mut engine, 91, 200.0).unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::StepAccepted {
            step_number: 1,
            complete: false,
            ..
        }
    ));
    assert_eq!(engine.current_function().unwrap().steps().len(), 1);
}

#[test]
fn mismatched_function_discards_in_flight_state() {
    let mut engine = curve_engine();
    dop(&mut engine, 91, 180.0).unwrap(); // charge_discharge step 1
    let err = dop(&mut engine, 191, 2.0).unwrap_err();
    assert!(matches!(err, ProtocolError::MismatchedFunction { .. }));
    assert!(engine.current_function().is_none());

    // The discarded partial function is gone for good: its step 2 now
    // arrives with step 1 missing.
    let err = dop(&mut engine, 92, 120.0).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MissingMandatoryStep { step_number: 1, .. }
    ));
}

#[test]
fn complete_function_yields_to_the_next_one() {
    let mut engine = curve_engine();
    dop(&mut engine, 91, 180.0).unwrap();
    dop(&mut engine, 92, 120.0).unwrap();

    let outcome = dop(&mut engine, 191, 1.0).unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::StepAccepted {
            step_number: 1,
            complete: false,
            ..
        }
    ));
    assert_eq!(engine.current_function().unwrap().definition().name, "curve");
}

#[test]
fn support_point_gates_the_curve_function() {
    let mut engine = engine();
    assert!(!engine.is_function_supported("curve"));
    assert!(engine.is_function_supported("charge_discharge"));

    let err = dop(&mut engine, 191, 1.0).unwrap_err();
    assert!(matches!(err, ProtocolError::UnsupportedFunction { .. }));

    let updates = engine
        .update_input_point("Curve.supported", &json!(true))
        .unwrap();
    assert_eq!(updates[0].index, 10);
    assert_eq!(updates[0].value, PointWriteValue::Binary(true));
    assert!(engine.is_function_supported("curve"));
    dop(&mut engine, 191, 1.0).unwrap();
}

#[test]
fn curve_array_reassembles_in_any_cell_order() {
    let mut engine = curve_engine();
    dop(&mut engine, 191, 1.0).unwrap();
    dop(&mut engine, 207, 1.0).unwrap(); // head starts the array
    dop(&mut engine, 210, 20.0).unwrap(); // row 1 column 1 before row 0 column 1
    dop(&mut engine, 208, 10.0).unwrap();
    let outcome = dop(&mut engine, 209, 2.0).unwrap();

    let IngestOutcome::StepAccepted {
        step_number,
        complete,
        instructions,
        ..
    } = outcome
    else {
        panic!("array element not accepted");
    };
    assert_eq!(step_number, 2);
    assert!(complete);
    let [Instruction::Publish(message)] = instructions.as_slice() else {
        panic!("expected a publish, got {:?}", instructions);
    };
    assert_eq!(message.expected_response.as_deref(), Some("Curve.In"));
    assert_eq!(
        message.points["CurveStart-X"],
        json!([
            {"CurveStart-X": 1.0, "CurveStart-Y": 10.0},
            {"CurveStart-X": 2.0, "CurveStart-Y": 20.0},
        ])
    );
    assert_eq!(engine.current_array().unwrap().len(), 4);
}

#[test]
fn write_past_the_array_bound_is_an_orphan() {
    let mut engine = curve_engine();
    dop(&mut engine, 191, 1.0).unwrap();
    dop(&mut engine, 207, 1.0).unwrap();
    // The array covers [207, 406]; 407 resolves to no definition.
    let err = dop(&mut engine, 407, 9.0).unwrap_err();
    assert!(matches!(err, ProtocolError::OrphanArrayElement { index: 407 }));
    // The in-flight function survives an orphan element.
    assert!(engine.current_function().is_some());
}

#[test]
fn unknown_index_without_an_array_in_flight() {
    let mut engine = engine();
    let err = dop(&mut engine, 999, 1.0).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::NoDefinition {
            point_type: PointType::AnalogOutput,
            index: 999,
        }
    ));
}

#[test]
fn selector_block_accumulates_and_saves_on_write() {
    let mut engine = curve_engine();
    dop(&mut engine, 191, 5.0).unwrap();
    let block = engine.current_block().unwrap();
    assert_eq!(block.block_index, 5);
    // The selector write itself sits inside [191, 442] and is part of the edit.
    assert_eq!(block.points().len(), 1);
    assert_eq!(block.points()[0].index, 191);

    // An ordinary point inside the bound lands in the block.
    let outcome = dop(&mut engine, 430, 99.0).unwrap();
    assert!(matches!(outcome, IngestOutcome::PointOnly));
    assert_eq!(engine.current_block().unwrap().points().len(), 2);

    // One outside the bound does not.
    dop(&mut engine, 150, 1.0).unwrap();
    assert_eq!(engine.current_block().unwrap().points().len(), 2);

    // The saved edit of instance 5 survives a reset of in-flight state.
    engine.reset();
    assert!(engine.current_block().is_none());
    assert!(engine.current_function().is_none());
    let saved = engine.saved_block("Curve.Edit", 5).unwrap();
    assert_eq!(saved.points().len(), 2);
    assert_eq!(saved.points()[0].index, 191);
    assert_eq!(saved.points()[1].index, 430);
    assert!(engine.saved_block("Curve.Edit", 6).is_none());
}

#[test]
fn select_phase_caches_without_advancing_state() {
    let mut engine = engine();
    let outcome = engine
        .ingest(
            CommandPhase::Select,
            92,
            PointWriteValue::Analog(7.0),
            None,
        )
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::PointOnly));
    assert!(engine.current_function().is_none());
    let cached = engine
        .latest_values()
        .get(PointType::AnalogOutput, 92)
        .unwrap();
    assert_eq!(cached.value, PointWriteValue::Analog(7.0));
}

#[test]
fn step_function_code_constraint_enforced() {
    let mut engine = engine();
    // Step 1 of charge_discharge only accepts direct_operate.
    let err = engine
        .ingest(
            CommandPhase::Select,
            91,
            PointWriteValue::Analog(180.0),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, ProtocolError::FunctionCodeNotAllowed { .. }));
    assert!(engine
        .latest_values()
        .get(PointType::AnalogOutput, 91)
        .is_none());
}

#[test]
fn non_function_traffic_is_point_only() {
    let mut engine = engine();
    let outcome = dop(&mut engine, 150, 3.5).unwrap();
    assert!(matches!(outcome, IngestOutcome::PointOnly));

    let outcome = engine
        .ingest(
            CommandPhase::DirectOperate,
            5,
            PointWriteValue::Relay(ControlCode::LatchOn),
            Some(OperateType::DirectOperateNoAck),
        )
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::PointOnly));
    let cached = engine
        .latest_values()
        .get(PointType::BinaryOutput, 5)
        .unwrap();
    assert_eq!(cached.value, PointWriteValue::Relay(ControlCode::LatchOn));
}

#[test]
fn array_input_updates_fan_out_row_major() {
    let mut engine = engine();
    let updates = engine
        .update_input_point("CurveStart-X", &json!([[1.0, 2.0], [3.0, 4.0]]))
        .unwrap();
    let indexes: Vec<u16> = updates.iter().map(|u| u.index).collect();
    assert_eq!(indexes, vec![207, 208, 209, 210]);
    assert_eq!(updates[3].value, PointWriteValue::Analog(4.0));
}

#[test]
fn input_updates_reject_output_points_and_bad_values() {
    let mut engine = engine();
    let err = engine
        .update_input_point("DCHA.WinTms", &json!(1.0))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::UnsupportedInputType(_)));

    let err = engine
        .update_input_point("Curve.In", &json!("not a number"))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidInputValue { .. }));
}
