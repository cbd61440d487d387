use serde_json::{json, Map, Value};

use super::{ConfigValue, TemplateOption};

pub const ENVIRONMENT_NAMESPACE: &str = "aws:cloudformation:template:parameter";
pub const ENVIRONMENT_OPTION: &str = "EnvironmentVariables";

enum Entry {
    Lit(&'static str),
    Deferred(&'static str),
}

use Entry::{Deferred, Lit};

#[rustfmt::skip]
const OPTIONS: &[(&str, &str, Entry)] = &[
    // launch configuration
    ("aws:autoscaling:launchconfiguration", "InstanceType", Lit("t2.medium")),
    ("aws:autoscaling:launchconfiguration", "IamInstanceProfile", Deferred("IamInstanceProfile")),
    ("aws:autoscaling:launchconfiguration", "EC2KeyName", Deferred("EC2KeyName")),
    ("aws:autoscaling:launchconfiguration", "RootVolumeSize", Lit("8")),
    ("aws:autoscaling:launchconfiguration", "SSHSourceRestriction", Lit("tcp,22,22,0.0.0.0/0")),
    // template parameters
    ("aws:cloudformation:template:parameter", "InstancePort", Lit("80")),
    // network
    ("aws:ec2:vpc", "ELBScheme", Lit("public")),
    ("aws:elasticbeanstalk:application", "Application Healthcheck URL", Lit("")),
    // autoscaling
    ("aws:autoscaling:asg", "Availability Zones", Lit("Any")),
    ("aws:autoscaling:asg", "Cooldown", Lit("360")),
    ("aws:autoscaling:asg", "Custom Availability Zones", Lit("")),
    ("aws:autoscaling:asg", "MaxSize", Lit("2")),
    ("aws:autoscaling:asg", "MinSize", Lit("1")),
    ("aws:autoscaling:trigger", "BreachDuration", Lit("1")),
    ("aws:autoscaling:trigger", "EvaluationPeriods", Lit("1")),
    ("aws:autoscaling:trigger", "LowerBreachScaleIncrement", Lit("-1")),
    ("aws:autoscaling:trigger", "LowerThreshold", Lit("20")),
    ("aws:autoscaling:trigger", "MeasureName", Lit("CPUUtilization")),
    ("aws:autoscaling:trigger", "Period", Lit("1")),
    ("aws:autoscaling:trigger", "Statistic", Lit("Maximum")),
    ("aws:autoscaling:trigger", "Unit", Lit("Percent")),
    ("aws:autoscaling:trigger", "UpperBreachScaleIncrement", Lit("1")),
    ("aws:autoscaling:trigger", "UpperThreshold", Lit("85")),
    // rolling updates
    ("aws:autoscaling:updatepolicy:rollingupdate", "MaxBatchSize", Lit("1")),
    ("aws:autoscaling:updatepolicy:rollingupdate", "MinInstancesInService", Lit("1")),
    ("aws:autoscaling:updatepolicy:rollingupdate", "RollingUpdateEnabled", Lit("true")),
    ("aws:autoscaling:updatepolicy:rollingupdate", "RollingUpdateType", Lit("Health")),
    ("aws:autoscaling:updatepolicy:rollingupdate", "Timeout", Lit("PT30M")),
    // logs
    ("aws:elasticbeanstalk:cloudwatch:logs", "DeleteOnTerminate", Lit("false")),
    ("aws:elasticbeanstalk:cloudwatch:logs", "RetentionInDays", Lit("7")),
    ("aws:elasticbeanstalk:cloudwatch:logs", "StreamLogs", Lit("false")),
    // deployment commands
    ("aws:elasticbeanstalk:command", "BatchSize", Lit("30")),
    ("aws:elasticbeanstalk:command", "BatchSizeType", Lit("Percentage")),
    ("aws:elasticbeanstalk:command", "DeploymentPolicy", Lit("Rolling")),
    ("aws:elasticbeanstalk:command", "IgnoreHealthCheck", Lit("false")),
    ("aws:elasticbeanstalk:command", "Timeout", Lit("300")),
    ("aws:elasticbeanstalk:control", "DefaultSSHPort", Lit("22")),
    ("aws:elasticbeanstalk:control", "LaunchTimeout", Lit("0")),
    ("aws:elasticbeanstalk:control", "LaunchType", Lit("Migration")),
    ("aws:elasticbeanstalk:control", "RollbackLaunchOnFailure", Lit("false")),
    // environment and roles
    ("aws:elasticbeanstalk:environment", "EnvironmentType", Lit("LoadBalanced")),
    ("aws:elasticbeanstalk:environment", "LoadBalancerType", Lit("classic")),
    ("aws:elasticbeanstalk:environment", "ServiceRole", Deferred("ServiceRole")),
    // health reporting
    ("aws:elasticbeanstalk:healthreporting:system", "HealthCheckSuccessThreshold", Lit("Ok")),
    ("aws:elasticbeanstalk:healthreporting:system", "SystemType", Lit("enhanced")),
    ("aws:elasticbeanstalk:hostmanager", "LogPublicationControl", Lit("false")),
    ("aws:elasticbeanstalk:managedactions", "ManagedActionsEnabled", Lit("false")),
    ("aws:elasticbeanstalk:managedactions:platformupdate", "InstanceRefreshEnabled", Lit("false")),
    ("aws:elasticbeanstalk:monitoring", "Automatically Terminate Unhealthy Instances", Lit("true")),
    ("aws:elb:healthcheck", "HealthyThreshold", Lit("3")),
    ("aws:elb:healthcheck", "Interval", Lit("10")),
    ("aws:elb:healthcheck", "Target", Lit("TCP:80")),
    ("aws:elb:healthcheck", "Timeout", Lit("5")),
    ("aws:elb:healthcheck", "UnhealthyThreshold", Lit("5")),
    // notifications
    ("aws:elasticbeanstalk:sns:topics", "Notification Endpoint", Deferred("NotificationEndpoint")),
    ("aws:elasticbeanstalk:sns:topics", "Notification Protocol", Lit("email")),
];

const INSTANCE_METRICS: &[&str] = &[
    "ApplicationLatencyP10", "ApplicationLatencyP50", "ApplicationLatencyP75",
    "ApplicationLatencyP85", "ApplicationLatencyP90", "ApplicationLatencyP95",
    "ApplicationLatencyP99", "ApplicationLatencyP99.9", "ApplicationRequests2xx",
    "ApplicationRequests3xx", "ApplicationRequests4xx", "ApplicationRequests5xx",
    "ApplicationRequestsTotal", "CPUIdle", "CPUIowait", "CPUIrq", "CPUNice", "CPUSoftirq",
    "CPUSystem", "CPUUser", "InstanceHealth", "LoadAverage1min", "LoadAverage5min",
    "RootFilesystemUtil",
];

const ENVIRONMENT_METRICS: &[&str] = &[
    "ApplicationLatencyP10", "ApplicationLatencyP50", "ApplicationLatencyP75",
    "ApplicationLatencyP85", "ApplicationLatencyP90", "ApplicationLatencyP95",
    "ApplicationLatencyP99", "ApplicationLatencyP99.9", "ApplicationRequests2xx",
    "ApplicationRequests3xx", "ApplicationRequests4xx", "ApplicationRequests5xx",
    "ApplicationRequestsTotal", "InstancesDegraded", "InstancesInfo", "InstancesNoData",
    "InstancesOk", "InstancesPending", "InstancesSevere", "InstancesUnknown",
    "InstancesWarning",
];

/// Enhanced-health document enabling every CloudWatch metric at the
/// default period.
pub fn health_config_document() -> String {
    let metrics = |names: &[&str]| -> Map<String, Value> {
        names.iter().map(|n| (n.to_string(), Value::Null)).collect()
    };
    json!({
        "Version": 1,
        "CloudWatchMetrics": {
            "Instance": metrics(INSTANCE_METRICS),
            "Environment": metrics(ENVIRONMENT_METRICS),
        }
    })
    .to_string()
}

/// The environment's option table without the environment variables
/// record, which is filled in per deployment.
pub fn default_template() -> Vec<TemplateOption> {
    let mut out: Vec<TemplateOption> = OPTIONS
        .iter()
        .map(|(namespace, option_name, entry)| TemplateOption {
            namespace: namespace.to_string(),
            option_name: option_name.to_string(),
            value: match entry {
                Lit(v) => ConfigValue::Literal(v.to_string()),
                Deferred(name) => ConfigValue::DeferredExternal(name.to_string()),
            },
        })
        .collect();
    out.push(TemplateOption {
        namespace: "aws:elasticbeanstalk:healthreporting:system".into(),
        option_name: "ConfigDocument".into(),
        value: ConfigValue::Literal(health_config_document()),
    });
    out
}
