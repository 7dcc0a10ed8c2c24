use anyhow::Result;
use fritz_exporter::{Collector, MetricSpec, PassReport};
use tracing::info;

use crate::common::{self, GatewayArgs};

/// Run a single pass per collector and print what every metric produced.
pub async fn run(args: &GatewayArgs) -> Result<()> {
    let (collectors, errors) = common::build_collectors(args).await?;
    for mut collector in collectors {
        let report = collector.collect_pass().await;
        print!("{}", describe(&collector, &report));
    }
    info!(errors = errors.get(), "test pass finished");
    Ok(())
}

/// Human readable dump of a pass: target, raw records, samples and errors.
pub fn describe(collector: &Collector, report: &PassReport) -> String {
    let mut out = format!("== {} backend ==\n", collector.backend_name());
    if let Some(failure) = &report.failure {
        out.push_str(&format!("pass failed: {failure}\n"));
        return out;
    }
    for (metric, result) in collector.catalog().metrics.iter().zip(&report.metrics) {
        out.push_str(&format!("{} ({})\n", result.fq_name, target(metric)));
        for record in &result.records {
            let fields: Vec<String> = record.iter().map(|(k, v)| format!("{k}={v}")).collect();
            out.push_str(&format!("  record {}\n", fields.join(" ")));
        }
        for sample in &result.samples {
            out.push_str(&format!("  sample {:?} = {}\n", sample.labels, sample.value));
        }
        for err in &result.errors {
            out.push_str(&format!("  error {err}\n"));
        }
    }
    out
}

fn target(metric: &MetricSpec) -> String {
    if !metric.page.is_empty() {
        return format!("page {} path {}", metric.page, metric.result_path);
    }
    match &metric.action_argument {
        Some(arg) if arg.has_provider() => format!(
            "{} {} {}<-{}.{}",
            metric.service, metric.action, arg.name, arg.provider_action, arg.value
        ),
        Some(arg) => format!("{} {} {}={}", metric.service, metric.action, arg.name, arg.value),
        None => format!("{} {}", metric.service, metric.action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fritz_exporter::{collect_errors_counter, ActionArgSpec, Catalog, MetricReport, Sample};
    use upnp_core::{ResultRecord, Value};

    #[test]
    fn target_names_the_call() {
        let mut metric = MetricSpec {
            service: "urn:dslforum-org:service:Hosts:1".into(),
            action: "GetGenericHostEntry".into(),
            action_argument: Some(ActionArgSpec {
                name: "NewIndex".into(),
                is_index: true,
                provider_action: "GetHostNumberOfEntries".into(),
                value: "HostNumberOfEntries".into(),
            }),
            ..Default::default()
        };
        assert_eq!(
            target(&metric),
            "urn:dslforum-org:service:Hosts:1 GetGenericHostEntry NewIndex<-GetHostNumberOfEntries.HostNumberOfEntries"
        );
        metric.action_argument = None;
        metric.page = "netDev".into();
        metric.result_path = "data.active".into();
        assert_eq!(target(&metric), "page netDev path data.active");
    }

    #[test]
    fn describe_lists_records_samples_and_errors() {
        let catalog = Catalog::from_json(
            r#"{"metrics":[{"promDesc":{"fqName":"gateway_uptime"},"page":"overview","resultPath":"data.uptime"}]}"#,
        )
        .expect("catalog");
        let errors = collect_errors_counter().expect("counter");
        let collector =
            Collector::lua(catalog, "http://fritz.box", "", "", "fritz.box", errors).expect("collector");
        let report = PassReport {
            metrics: vec![MetricReport {
                fq_name: "gateway_uptime".into(),
                records: vec![ResultRecord::from([("result".to_string(), Value::Float(42.0))])],
                samples: vec![Sample {
                    value: 42.0,
                    labels: vec![],
                }],
                errors: vec!["boom".into()],
            }],
            failure: None,
        };
        let text = describe(&collector, &report);
        assert!(text.starts_with("== lua backend ==\n"));
        assert!(text.contains("gateway_uptime (page overview path data.uptime)"));
        assert!(text.contains("  record result=42"));
        assert!(text.contains("  sample [] = 42"));
        assert!(text.contains("  error boom"));
    }
}
