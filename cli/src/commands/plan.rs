// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Plan Command
//!
//! Implements `edgefleet plan`, which replays a scenario of lifecycle
//! operations against an in-memory store and prints the resulting records
//! and the change-tracking flags each host would observe.
//!
//! Every operation runs in its own unit of work, so a failing step shows the
//! rollback: its writes and events never appear in the output.
//!
//! # Scenario Format
//!
//! ```yaml
//! userId: 7
//! fleet:
//!   hosts:
//!     - { uuid: system-host, name: system, isSystem: true, userId: 1 }
//!     - { uuid: edge-1, name: edge-1, userId: 7 }
//!   routers:
//!     - { id: 1, host: 1.2.3.4, messagingPort: 5672, iofogUuid: system-host, isDefault: true }
//!   flows:
//!     - { id: 1, name: pipeline, userId: 7 }
//!   catalog:
//!     - { id: 100, name: proxy, category: SYSTEM, images: [{ containerImage: edgefleet/proxy, fogTypeId: 1 }] }
//!   proxyCatalogItemId: 100
//! operations:
//!   - create: { name: web, flowId: 1, iofogUuid: edge-1, images: [...], ports: [{ internal: 80, external: 8080, publicPort: 1234 }] }
//!   - delete: web
//! ```
//!
//! Operations refer to microservices by name; names in a definition's
//! `routes` list are resolved the same way.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use edgefleet_core::application::{MicroserviceService, StandardMicroserviceService};
use edgefleet_core::domain::controller_config::ControllerConfigManifest;
use edgefleet_core::domain::errors::ControllerError;
use edgefleet_core::domain::fleet::{CatalogItem, Flow, Host, Registry, Router, ScopeMode, User};
use edgefleet_core::domain::microservice::{MicroserviceDefinition, MicroserviceId, MicroserviceUpdate};
use edgefleet_core::domain::port_mapping::PortMappingRequest;
use edgefleet_core::domain::repository::{TransactionCoordinator, UnitOfWork};
use edgefleet_core::infrastructure::{
    InMemoryCatalog, InMemoryFleet, InMemoryFlows, InMemoryStore, StandardInputValidator,
};

#[derive(Args)]
pub struct PlanCommand {
    /// Scenario YAML file
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,

    /// Print the final records as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

// ============================================================================
// Scenario
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default = "default_user_id")]
    pub user_id: i64,
    #[serde(default)]
    pub scope: ScopeMode,
    pub fleet: FleetFixture,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

fn default_user_id() -> i64 {
    1
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetFixture {
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub routers: Vec<Router>,
    #[serde(default)]
    pub registries: Vec<Registry>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub catalog: Vec<CatalogItem>,
    #[serde(default)]
    pub proxy_catalog_item_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Create(MicroserviceDefinition),
    Update {
        target: String,
        changes: MicroserviceUpdate,
    },
    Delete(String),
    AddPorts {
        target: String,
        ports: Vec<PortMappingRequest>,
    },
    Route {
        source: String,
        dest: String,
    },
    Unroute {
        source: String,
        dest: String,
    },
}

impl Operation {
    fn label(&self) -> String {
        match self {
            Self::Create(definition) => format!("create {}", definition.name),
            Self::Update { target, .. } => format!("update {}", target),
            Self::Delete(target) => format!("delete {}", target),
            Self::AddPorts { target, ports } => format!("add {} port(s) to {}", ports.len(), target),
            Self::Route { source, dest } => format!("route {} -> {}", source, dest),
            Self::Unroute { source, dest } => format!("unroute {} -> {}", source, dest),
        }
    }
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse scenario")
    }
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Debug)]
pub struct OperationOutcome {
    pub label: String,
    pub result: Result<String, String>,
}

pub struct PlanReport {
    pub outcomes: Vec<OperationOutcome>,
    pub store: InMemoryStore,
}

struct Planner {
    service: StandardMicroserviceService,
    store: InMemoryStore,
    user: User,
    scope: ScopeMode,
    names: HashMap<String, MicroserviceId>,
}

impl Planner {
    fn resolve(&self, name: &str) -> MicroserviceId {
        self.names
            .get(name)
            .cloned()
            .unwrap_or_else(|| MicroserviceId::new(name))
    }

    async fn run(&mut self, operation: Operation) -> Result<String, ControllerError> {
        let mut tx = self.store.begin().await?;
        let summary = self.apply(operation, tx.as_mut()).await?;
        tx.commit().await?;
        Ok(summary)
    }

    async fn apply(&mut self, operation: Operation, tx: &mut dyn UnitOfWork) -> Result<String, ControllerError> {
        let (user, scope) = (self.user, self.scope);
        match operation {
            Operation::Create(mut definition) => {
                definition.routes = definition
                    .routes
                    .iter()
                    .map(|dest| self.resolve(dest.as_str()))
                    .collect();
                let view = self
                    .service
                    .create_microservice(definition, &user, scope, tx)
                    .await?;
                self.names
                    .insert(view.microservice.name.clone(), view.microservice.uuid.clone());
                Ok(format!("{} on {}", view.microservice.uuid, view.microservice.iofog_uuid))
            }
            Operation::Update { target, changes } => {
                let uuid = self.resolve(&target);
                let view = self
                    .service
                    .update_microservice(&uuid, changes, &user, scope, tx)
                    .await?;
                if view.microservice.name != target {
                    self.names.remove(&target);
                    self.names.insert(view.microservice.name.clone(), uuid);
                }
                Ok(format!("rebuild={}", view.microservice.rebuild))
            }
            Operation::Delete(target) => {
                let uuid = self.resolve(&target);
                self.service.delete_microservice(&uuid, &user, scope, tx).await?;
                self.names.remove(&target);
                Ok(uuid.to_string())
            }
            Operation::AddPorts { target, ports } => {
                let uuid = self.resolve(&target);
                let count = ports.len();
                self.service
                    .add_port_mappings(&uuid, ports, &user, scope, tx)
                    .await?;
                Ok(format!("{} mapping(s)", count))
            }
            Operation::Route { source, dest } => {
                let route = self
                    .service
                    .create_route(&self.resolve(&source), &self.resolve(&dest), &user, scope, tx)
                    .await?;
                Ok(format!("network={}", route.is_network_connection))
            }
            Operation::Unroute { source, dest } => {
                self.service
                    .delete_route(&self.resolve(&source), &self.resolve(&dest), &user, scope, tx)
                    .await?;
                Ok(String::new())
            }
        }
    }
}

/// Replay a scenario; operation failures are recorded, not returned
pub async fn run_scenario(scenario: Scenario, config: &ControllerConfigManifest) -> Result<PlanReport> {
    let store = InMemoryStore::new();
    let fixture = scenario.fleet;

    if fixture.registries.is_empty() {
        store
            .add_registry(Registry {
                id: config.spec.microservices.default_registry_id,
                url: "registry.hub.docker.com".to_string(),
                is_public: true,
            })
            .await;
    }
    for registry in fixture.registries {
        store.add_registry(registry).await;
    }
    for router in fixture.routers {
        store.add_router(router).await;
    }

    let fleet = InMemoryFleet::new();
    for host in fixture.hosts {
        fleet.add_host(host);
    }
    let flows = InMemoryFlows::new();
    for flow in fixture.flows {
        flows.add_flow(flow);
    }
    let mut catalog = InMemoryCatalog::new();
    for item in fixture.catalog {
        if Some(item.id) == fixture.proxy_catalog_item_id {
            catalog = catalog.with_proxy_item(item);
        } else {
            catalog.add_item(item);
        }
    }

    let service = StandardMicroserviceService::new(
        Arc::new(catalog),
        Arc::new(fleet),
        Arc::new(flows),
        Arc::new(StandardInputValidator::new()),
        config.spec.microservices.clone(),
        config.spec.proxy.clone(),
    );

    let mut planner = Planner {
        service,
        store: store.clone(),
        user: User::new(scenario.user_id),
        scope: scenario.scope,
        names: HashMap::new(),
    };

    let mut outcomes = Vec::with_capacity(scenario.operations.len());
    for operation in scenario.operations {
        let label = operation.label();
        let result = planner.run(operation).await.map_err(|e| e.to_string());
        if let Err(error) = &result {
            tracing::warn!("Operation '{}' rolled back: {}", label, error);
        }
        outcomes.push(OperationOutcome { label, result });
    }

    Ok(PlanReport { outcomes, store })
}

pub async fn execute(cmd: PlanCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = ControllerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let yaml = std::fs::read_to_string(&cmd.scenario)
        .with_context(|| format!("Failed to read scenario {:?}", cmd.scenario))?;
    let scenario = Scenario::from_yaml_str(&yaml)?;

    println!("{}", format!("Planning {}", cmd.scenario.display()).bold());
    let report = run_scenario(scenario, &config).await?;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(detail) => println!("  {} {} {}", "✓".green(), outcome.label, detail.dimmed()),
            Err(error) => println!("  {} {}: {}", "✗".red(), outcome.label, error.red()),
        }
    }
    println!();

    let microservices = report.store.microservices().await;
    let public_ports = report.store.public_ports().await;
    let routes = report.store.routes().await;
    let tracking = report.store.all_change_tracking().await;

    if cmd.json {
        let records = serde_json::json!({
            "microservices": microservices,
            "publicPorts": public_ports,
            "routes": routes,
            "changeTracking": tracking,
        });
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("{}", "Microservices:".bold());
    for microservice in &microservices {
        println!(
            "  {} {} on {}{}",
            microservice.uuid,
            microservice.name.bold(),
            microservice.iofog_uuid,
            if microservice.rebuild { " (rebuild)".yellow().to_string() } else { String::new() }
        );
    }
    println!();

    if !public_ports.is_empty() {
        println!("{}", "Public ports:".bold());
        for public_port in &public_ports {
            println!(
                "  {}:{} via {} -> {}",
                public_port.scheme(),
                public_port.public_port,
                public_port
                    .host_id
                    .as_ref()
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "(local only)".to_string()),
                public_port.queue_name
            );
        }
        println!();
    }

    if !routes.is_empty() {
        println!("{}", "Routes:".bold());
        for route in &routes {
            println!(
                "  {} -> {}{}",
                route.source_microservice_uuid,
                route.dest_microservice_uuid,
                if route.is_network_connection { " (network)" } else { "" }
            );
        }
        println!();
    }

    println!("{}", "Pending changes:".bold());
    for host in &tracking {
        let pending: Vec<&str> = host.pending().into_iter().map(|c| c.as_str()).collect();
        println!("  {}: {}", host.iofog_uuid, pending.join(", "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgefleet_core::domain::change_tracking::ChangeCategory;
    use edgefleet_core::domain::fleet::HostId;

    const SCENARIO: &str = r#"
userId: 7
fleet:
  hosts:
    - { uuid: system-host, name: system, isSystem: true, userId: 1 }
    - { uuid: edge-1, name: edge-1, userId: 7 }
    - { uuid: edge-2, name: edge-2, userId: 7 }
  routers:
    - { id: 1, host: 1.2.3.4, messagingPort: 5672, iofogUuid: system-host, isDefault: true }
  flows:
    - { id: 1, name: pipeline, userId: 7 }
  catalog:
    - { id: 100, name: proxy, category: SYSTEM, images: [{ containerImage: edgefleet/proxy, fogTypeId: 1 }] }
  proxyCatalogItemId: 100
operations:
  - create:
      name: sink
      flowId: 1
      iofogUuid: edge-2
      images: [{ containerImage: "busybox:1.36", fogTypeId: 1 }]
  - create:
      name: web
      flowId: 1
      iofogUuid: edge-1
      images: [{ containerImage: "nginx:1.27", fogTypeId: 1 }]
      ports: [{ internal: 80, external: 8080, publicPort: 1234 }]
      routes: [sink]
  - create:
      name: web
      flowId: 1
      iofogUuid: edge-2
      images: [{ containerImage: "nginx:1.27", fogTypeId: 1 }]
  - delete: web
"#;

    #[tokio::test]
    async fn test_scenario_replays_operations() {
        let scenario = Scenario::from_yaml_str(SCENARIO).unwrap();
        assert_eq!(scenario.operations.len(), 4);

        let report = run_scenario(scenario, &ControllerConfigManifest::default())
            .await
            .unwrap();

        let results: Vec<bool> = report.outcomes.iter().map(|o| o.result.is_ok()).collect();
        assert_eq!(results, vec![true, true, false, true]);

        // Only the sink survives; the proxies went with the deleted microservice
        let microservices = report.store.microservices().await;
        assert_eq!(microservices.len(), 1);
        assert_eq!(microservices[0].name, "sink");
        assert!(report.store.routes().await.is_empty());
        assert!(report.store.public_ports().await.is_empty());

        let edge_2 = report
            .store
            .change_tracking(&HostId::new("edge-2"))
            .await
            .unwrap();
        assert_eq!(edge_2.broadest(), Some(ChangeCategory::MicroserviceFull));
    }

    #[test]
    fn test_scenario_requires_fleet() {
        assert!(Scenario::from_yaml_str("operations: []").is_err());
    }
}
