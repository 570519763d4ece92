//! Ready-made service records, one per role.

use std::collections::BTreeMap;

use super::{
    catalog::SpecificationCatalog,
    error::Result,
    spec::{HealthCheckRecord, RestartPolicy, ServiceRecord, ServiceRole},
    tier::LoadLevel,
};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub fn default_record(role: ServiceRole) -> ServiceRecord {
    let base = ServiceRecord {
        role: role.as_str().to_string(),
        restart_policy: RestartPolicy::Always.as_str().to_string(),
        ..Default::default()
    };
    match role {
        ServiceRole::Database => ServiceRecord {
            image: "postgres:latest".to_string(),
            load_level: LoadLevel::High,
            hostname: Some("db".to_string()),
            ports: strings(&["5432:5432"]),
            volumes: strings(&["harbormaster_db_data:/var/lib/postgresql/data"]),
            env_vars: env(&[
                ("POSTGRES_USER", "admin"),
                ("POSTGRES_PASSWORD", "password"),
                ("POSTGRES_DB", "mydb"),
            ]),
            health_check: Some(HealthCheckRecord {
                test: strings(&["CMD-SHELL", "pg_isready -U admin"]),
                interval: "30s".to_string(),
                timeout: "5s".to_string(),
                retries: 5,
                start_period: "10s".to_string(),
            }),
            ..base
        },
        ServiceRole::Cache => ServiceRecord {
            image: "redis:latest".to_string(),
            hostname: Some("cache".to_string()),
            ports: strings(&["6379:6379"]),
            volumes: strings(&["harbormaster_cache_data:/data"]),
            env_vars: env(&[("REDIS_PASSWORD", "secret")]),
            health_check: Some(HealthCheckRecord {
                test: strings(&["CMD", "redis-cli", "ping"]),
                interval: "30s".to_string(),
                timeout: "5s".to_string(),
                retries: 3,
                start_period: String::new(),
            }),
            ..base
        },
        ServiceRole::LoadBalancer => ServiceRecord {
            image: "haproxy:latest".to_string(),
            load_level: LoadLevel::Low,
            hostname: Some("lb".to_string()),
            ports: strings(&["5000:5000", "5001:5001"]),
            volumes: strings(&["harbormaster_haproxy_config:/usr/local/etc/haproxy"]),
            ..base
        },
        ServiceRole::PrimaryServer => ServiceRecord {
            image: "nginx:latest".to_string(),
            hostname: Some("server-main".to_string()),
            ports: strings(&["80:80", "443:443"]),
            volumes: strings(&[
                "harbormaster_nginx_config:/etc/nginx",
                "harbormaster_nginx_logs:/var/log/nginx",
            ]),
            ..base
        },
        ServiceRole::SecondaryServer => ServiceRecord {
            image: "httpd:latest".to_string(),
            hostname: Some("server-add".to_string()),
            ports: strings(&["8080:80"]),
            volumes: strings(&["harbormaster_httpd_data:/usr/local/apache2/htdocs"]),
            ..base
        },
        ServiceRole::Other => ServiceRecord {
            image: "alpine:latest".to_string(),
            load_level: LoadLevel::Low,
            volumes: strings(&["harbormaster_other_data:/data"]),
            restart_policy: RestartPolicy::OnFailure.as_str().to_string(),
            ..base
        },
    }
}

/// Roles started when no catalog file is configured.
pub const DEFAULT_TOPOLOGY: [ServiceRole; 5] = [
    ServiceRole::Database,
    ServiceRole::Cache,
    ServiceRole::LoadBalancer,
    ServiceRole::PrimaryServer,
    ServiceRole::SecondaryServer,
];

pub fn default_catalog(roles: &[ServiceRole]) -> Result<SpecificationCatalog> {
    SpecificationCatalog::new(roles.iter().map(|role| default_record(*role)))
}
