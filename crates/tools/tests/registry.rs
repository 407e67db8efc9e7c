//! The tool boundary as an agent sees it: JSON in, JSON out.

use futures::future::join_all;
use oilstab_config::AppConfig;
use oilstab_core::{EngineError, ProcessEngine, SimulationRequest, ToolCall};
use oilstab_session::SessionManager;
use oilstab_tools::default_registry;
use serde_json::json;
use std::sync::Arc;

fn manager() -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        Arc::new(oilstab_engine::create_engine),
        AppConfig::default(),
    ))
}

fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: "call_1".into(),
        name: name.into(),
        arguments,
    }
}

fn nominal_arguments() -> serde_json::Value {
    SimulationRequest::nominal().to_arguments()
}

#[test]
fn registry_advertises_both_tools() {
    let registry = default_registry(manager());
    let defs = registry.definitions();
    let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["simulate_oil_stabilization", "simulation_liveness"]);

    let simulate = &defs[0];
    assert!(simulate.description.contains("0.96"));
    assert!(simulate.description.contains("100 bara"));
    assert!(simulate.description.contains("cricondenbar_bara"));
    assert_eq!(simulate.parameters["required"].as_array().unwrap().len(), 7);
    assert_eq!(
        simulate.parameters["properties"]["separator_pressures"]["minItems"],
        3
    );
}

#[tokio::test]
async fn nominal_call_returns_all_metrics() {
    let registry = default_registry(manager());
    let result = registry
        .execute(&call("simulate_oil_stabilization", nominal_arguments()))
        .await
        .unwrap();

    assert!(result.success, "{}", result.output);
    assert_eq!(result.call_id, "call_1");
    let data = result.data.unwrap();
    assert_eq!(data["convergence_status"], "success");
    assert_eq!(data["compressor_power_kw"].as_array().unwrap().len(), 4);
    for field in [
        "tvp_bara",
        "cricondenbar_bara",
        "stable_oil_flow_rate",
        "export_gas_flow_rate",
    ] {
        assert!(data[field].as_f64().unwrap() > 0.0, "{field}");
    }
    assert!(data["recycle_iterations"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn invalid_pressures_are_rejected_before_the_engine() {
    let manager = manager();
    let registry = default_registry(manager.clone());
    let mut arguments = nominal_arguments();
    arguments["separator_pressures"] = json!([75.0, 80.0, 1.9]);

    let result = registry
        .execute(&call("simulate_oil_stabilization", arguments))
        .await
        .unwrap();

    assert!(!result.success);
    let data = result.data.unwrap();
    assert_eq!(data["convergence_status"], "validation_error");
    assert!(
        data["error_message"]
            .as_str()
            .unwrap()
            .contains("separator_pressures")
    );
    assert!(data.get("tvp_bara").is_none());
    assert!(manager.timeline().is_empty());
    assert_eq!(manager.liveness().completed + manager.liveness().failed, 0);
}

#[tokio::test]
async fn missing_and_mistyped_fields_are_validation_errors() {
    let registry = default_registry(manager());

    let mut missing = nominal_arguments();
    missing.as_object_mut().unwrap().remove("reflux_ratio");
    let mut mistyped = nominal_arguments();
    mistyped["well_flow_rate"] = json!("ten");
    let mut short = nominal_arguments();
    short["heater_cooler_temperatures"] = json!([75.9, 75.9]);

    for arguments in [missing, mistyped, short] {
        let result = registry
            .execute(&call("simulate_oil_stabilization", arguments))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.data.unwrap()["convergence_status"], "validation_error");
    }
}

#[tokio::test]
async fn non_object_arguments_are_validation_errors() {
    let manager = manager();
    let registry = default_registry(manager.clone());

    for arguments in [json!([1, 2, 3]), json!(null), json!("run it")] {
        let result = registry
            .execute(&call("simulate_oil_stabilization", arguments))
            .await
            .unwrap();
        assert!(!result.success);
        let data = result.data.unwrap();
        assert_eq!(data["convergence_status"], "validation_error");
        assert!(data["error_message"].as_str().unwrap().contains("arguments"));
    }
    assert!(manager.timeline().is_empty());
}

#[tokio::test]
async fn liveness_reports_ready_session() {
    let registry = default_registry(manager());
    let result = registry
        .execute(&call("simulation_liveness", json!({})))
        .await
        .unwrap();
    assert!(result.success);
    let data = result.data.unwrap();
    assert_eq!(data["ready"], true);
    assert_eq!(data["state"], "idle");
    assert_eq!(data["queue_depth"], 0);
    assert_eq!(data["engine_generation"], 1);
}

#[tokio::test]
async fn unavailable_engine_is_a_build_error() {
    let factory = || -> Result<Box<dyn ProcessEngine>, EngineError> {
        Err(EngineError::Unavailable("license server down".into()))
    };
    let manager = Arc::new(SessionManager::new(Arc::new(factory), AppConfig::default()));
    let registry = default_registry(manager);

    let result = registry
        .execute(&call("simulate_oil_stabilization", nominal_arguments()))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.data.unwrap()["convergence_status"], "build_error");

    let health = registry
        .execute(&call("simulation_liveness", json!({})))
        .await
        .unwrap();
    assert!(!health.success);
    assert_eq!(health.data.unwrap()["ready"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_each_get_their_own_result() {
    let manager = manager();
    let registry = default_registry(manager.clone());

    let calls: Vec<ToolCall> = [0.0, 0.5, 1.0]
        .into_iter()
        .enumerate()
        .map(|(i, reflux)| {
            let mut arguments = nominal_arguments();
            arguments["reflux_ratio"] = json!(reflux);
            ToolCall {
                id: format!("call_{i}"),
                name: "simulate_oil_stabilization".into(),
                arguments,
            }
        })
        .collect();

    let results = join_all(calls.iter().map(|c| registry.execute(c))).await;
    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert!(result.success, "{}", result.output);
        assert_eq!(result.call_id, format!("call_{i}"));
    }
    assert!(manager.timeline().overlapping().is_empty());
    assert_eq!(manager.engine_is_clear().await, Some(true));
}
