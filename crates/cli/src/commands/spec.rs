//! HPA metric spec of a trigger

use anyhow::Result;
use colored::Colorize;
use k8s_openapi::api::autoscaling::v2::{MetricSpec, MetricTarget as HpaMetricTarget};
use tabled::Tabled;

use super::TriggerArgs;
use crate::client::ClusterClients;
use crate::output::{print_json, print_table, OutputFormat};

/// Row for the metric spec table
#[derive(Tabled)]
struct MetricSpecRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Target Type")]
    target_type: String,
    #[tabled(rename = "Target")]
    target: String,
}

fn target_value(target: &HpaMetricTarget) -> String {
    if let Some(utilization) = target.average_utilization {
        format!("{}%", utilization)
    } else if let Some(value) = &target.average_value {
        value.0.clone()
    } else {
        "-".to_string()
    }
}

fn spec_row(spec: &MetricSpec) -> MetricSpecRow {
    let (resource, container, target) = match (&spec.resource, &spec.container_resource) {
        (Some(source), _) => (source.name.clone(), "-".to_string(), &source.target),
        (None, Some(source)) => (
            source.name.clone(),
            source.container.clone(),
            &source.target,
        ),
        (None, None) => {
            return MetricSpecRow {
                source: spec.type_.clone(),
                resource: "-".to_string(),
                container: "-".to_string(),
                target_type: "-".to_string(),
                target: "-".to_string(),
            }
        }
    };

    MetricSpecRow {
        source: spec.type_.clone(),
        resource,
        container,
        target_type: target.type_.clone(),
        target: target_value(target),
    }
}

/// Print the metric spec the trigger registers with the HPA
pub async fn show_spec(
    clients: &ClusterClients,
    args: &TriggerArgs,
    namespace: String,
    format: OutputFormat,
) -> Result<()> {
    let scaler = args.build_scaler(clients, namespace).await?;
    let specs = vec![scaler.metric_spec()];

    match format {
        OutputFormat::Json => print_json(&specs)?,
        OutputFormat::Table => {
            println!("{}", "HPA Metric Spec".bold());
            let rows: Vec<MetricSpecRow> = specs.iter().map(spec_row).collect();
            print_table(&rows);
        }
    }

    Ok(())
}
