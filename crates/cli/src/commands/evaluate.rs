//! One-off evaluation of a trigger against the cluster

use anyhow::Result;
use colored::Colorize;
use scaler_lib::scaler::{Evaluation, MetricTarget, ResourceScaler};
use serde::Serialize;

use super::TriggerArgs;
use crate::client::ClusterClients;
use crate::output::{color_activity, print_info, print_json, print_success, print_warning, OutputFormat};

/// JSON shape of an evaluation
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationOutput<'a> {
    scaled_object: &'a str,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    workload: Option<String>,
    metric: &'a str,
    target: &'a MetricTarget,
    #[serde(flatten)]
    evaluation: &'a Evaluation,
}

fn describe_target(target: &MetricTarget) -> (String, String) {
    match target {
        MetricTarget::AverageValue {
            average_value,
            activation_average_value,
        } => (
            format!("{} (AverageValue)", average_value),
            activation_average_value.to_string(),
        ),
        MetricTarget::Utilization {
            average_utilization,
            activation_average_utilization,
        } => (
            format!("{}% (Utilization)", average_utilization),
            format!("{}%", activation_average_utilization),
        ),
    }
}

fn print_evaluation(
    args: &TriggerArgs,
    scaler: &ResourceScaler,
    evaluation: &Evaluation,
    format: OutputFormat,
) -> Result<()> {
    let metadata = scaler.metadata();
    let workload = metadata
        .workload
        .as_ref()
        .map(|w| format!("{}/{}", w.kind, w.name));

    match format {
        OutputFormat::Json => print_json(&EvaluationOutput {
            scaled_object: &args.scaled_object,
            namespace: &metadata.namespace,
            workload,
            metric: scaler.resource().as_str(),
            target: &metadata.target,
            evaluation,
        })?,
        OutputFormat::Table => {
            let (target, activation) = describe_target(&metadata.target);

            println!("{}", "Resource Evaluation".bold());
            println!("{}", "=".repeat(50));
            println!("Scaled object:  {}", args.scaled_object.cyan());
            println!("Namespace:      {}", metadata.namespace.cyan());
            if let Some(workload) = &workload {
                println!("Workload:       {}", workload.cyan());
            }
            if let Some(container) = &metadata.container_name {
                println!("Container:      {}", container.cyan());
            }
            println!("Metric:         {}", scaler.resource());
            println!("Target:         {}", target);
            println!("Activation:     {}", activation);
            println!();

            match &evaluation.aggregate {
                Some(aggregate) => {
                    println!("Current:        {}", aggregate.to_string().bold());
                    println!("Pods:           {}", aggregate.pod_count());
                    println!();
                    let message = format!("Workload is {}", color_activity(evaluation.active));
                    if evaluation.active {
                        print_success(&message);
                    } else {
                        print_info(&message);
                    }
                }
                None => print_warning("ScaledJob triggers are never active, evaluation skipped"),
            }
        }
    }

    Ok(())
}

/// Evaluate a trigger once and print the decision
pub async fn evaluate(
    clients: &ClusterClients,
    args: &TriggerArgs,
    namespace: String,
    format: OutputFormat,
) -> Result<()> {
    let scaler = args.build_scaler(clients, namespace).await?;
    let evaluation = scaler.evaluate(args.resource_name()?.as_str()).await?;

    print_evaluation(args, &scaler, &evaluation, format)
}
