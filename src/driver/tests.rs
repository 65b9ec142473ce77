use std::time::{Duration, Instant};

use super::create::next_free_vmid;
use super::*;
use crate::api::{NodeEntry, StorageItem, VmAction, VmKind};
use crate::error::DriverError;
use crate::poll::PollPolicy;
use crate::test_support::{
    ApiCall, RecordingEventSink, ScriptedBootstrap, ScriptedCluster, resource,
};

fn fast_policies() -> PollPolicies {
    let quick = PollPolicy::new(Duration::from_millis(5), Duration::from_millis(40));
    PollPolicies {
        name_lookup: quick,
        start: quick,
        stop: quick,
        shutdown: quick,
        create_running: quick,
        agent: quick,
        ssh_attempts: 2,
        ssh_backoff: Duration::from_millis(5),
        ssh_connect_timeout: Duration::from_millis(20),
    }
}

struct Fixture {
    cluster: ScriptedCluster,
    events: RecordingEventSink,
    driver: ProxmoxDriver<ScriptedCluster, RecordingEventSink, ScriptedBootstrap>,
}

fn fixture() -> Fixture {
    let cluster = ScriptedCluster::default();
    let events = RecordingEventSink::default();
    let driver = ProxmoxDriver::new(
        cluster.clone(),
        events.clone(),
        ScriptedBootstrap::default(),
    )
    .with_policies(fast_policies());
    Fixture {
        cluster,
        events,
        driver,
    }
}

fn web_inventory(status: &str) -> Vec<crate::api::ClusterResource> {
    vec![
        resource(100, "pm1", VmKind::Qemu, "tmpl-a", "stopped"),
        resource(101, "pm1", VmKind::Qemu, "web-1", status),
    ]
}

#[tokio::test]
async fn wait_for_status_returns_immediately_when_already_converged() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    fx.cluster.push_status("running");
    let vm = fx
        .driver
        .resolve_by_name("web-1", &fx.driver.policies().name_lookup)
        .await
        .expect("resolvable");

    let started = Instant::now();
    let result = fx
        .driver
        .wait_for_status(&vm, "running", &fx.driver.policies().start)
        .await;

    assert_eq!(result, Ok(()));
    assert_eq!(fx.cluster.status_fetches(), 1);
    assert!(
        started.elapsed() < Duration::from_millis(5),
        "converged wait must not sleep"
    );
}

#[tokio::test]
async fn wait_for_status_times_out_when_never_converging() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    fx.cluster.push_status("running");
    let vm = fx
        .driver
        .resolve_by_name("web-1", &fx.driver.policies().name_lookup)
        .await
        .expect("resolvable");

    let started = Instant::now();
    let result = fx
        .driver
        .wait_for_status(&vm, "stopped", &fx.driver.policies().stop)
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(DriverError::Timeout { .. })));
    assert!(elapsed >= Duration::from_millis(40), "failed early: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(40 + 5 + 40),
        "overran budget: {elapsed:?}"
    );
}

#[tokio::test]
async fn resolve_by_name_retries_until_the_clone_becomes_visible() {
    let fx = fixture();
    fx.cluster.push_inventory(vec![]);
    fx.cluster.push_inventory(vec![]);
    fx.cluster.push_inventory(web_inventory("stopped"));

    let vm = fx
        .driver
        .resolve_by_name("web-1", &fx.driver.policies().name_lookup)
        .await
        .expect("visible on the third fetch");

    assert_eq!(vm.vmid, 101);
    assert_eq!(vm.node, "pm1");
    assert_eq!(vm.kind, VmKind::Qemu);
    let list_calls = fx
        .cluster
        .calls()
        .iter()
        .filter(|call| matches!(call, ApiCall::ListVms))
        .count();
    assert_eq!(list_calls, 3);
}

#[tokio::test]
async fn resolve_by_name_survives_a_transient_transport_failure() {
    let fx = fixture();
    fx.cluster.push_inventory_failure("connection reset by peer");
    fx.cluster.push_inventory(web_inventory("stopped"));

    let vm = fx
        .driver
        .resolve_by_name("web-1", &fx.driver.policies().name_lookup)
        .await
        .expect("resolvable once the link recovers");

    assert_eq!(vm.vmid, 101);
    let list_calls = fx
        .cluster
        .calls()
        .iter()
        .filter(|call| matches!(call, ApiCall::ListVms))
        .count();
    assert_eq!(list_calls, 2);
}

#[tokio::test]
async fn wait_for_status_survives_a_transient_transport_failure() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    fx.cluster.push_status_failure("gateway timeout");
    fx.cluster.push_status("running");
    let vm = fx
        .driver
        .resolve_by_name("web-1", &fx.driver.policies().name_lookup)
        .await
        .expect("resolvable");

    let result = fx
        .driver
        .wait_for_status(&vm, "running", &fx.driver.policies().start)
        .await;

    assert_eq!(result, Ok(()));
    assert_eq!(fx.cluster.status_fetches(), 2);
}

#[tokio::test]
async fn agent_wait_survives_a_transient_transport_failure() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    fx.cluster.push_agent_failure("connection reset by peer");
    fx.cluster
        .push_agent_probe(crate::api::AgentProbe::Ready(vec![]));
    let vm = fx
        .driver
        .resolve_by_name("web-1", &fx.driver.policies().name_lookup)
        .await
        .expect("resolvable");

    let interfaces = fx
        .driver
        .wait_for_agent_interfaces(&vm, &fx.driver.policies().agent)
        .await
        .expect("agent answers after the link recovers");

    assert!(interfaces.is_empty());
}

#[tokio::test]
async fn resolve_by_name_reports_not_found_only_after_the_budget() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));

    let started = Instant::now();
    let result = fx
        .driver
        .resolve_by_name("nonesuch", &fx.driver.policies().name_lookup)
        .await;

    assert_eq!(
        result,
        Err(DriverError::NotFound {
            resource: String::from("VM named 'nonesuch'"),
        })
    );
    assert!(
        started.elapsed() >= Duration::from_millis(40),
        "must exhaust the retry budget before giving up"
    );
}

#[tokio::test]
async fn resolve_by_id_does_not_retry() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));

    let vm = fx.driver.resolve_by_id(101).await.expect("present");
    assert_eq!(vm.name, "web-1");

    let started = Instant::now();
    let missing = fx.driver.resolve_by_id(999).await;
    assert!(matches!(missing, Err(DriverError::NotFound { .. })));
    assert!(
        started.elapsed() < Duration::from_millis(5),
        "absent ids fail immediately"
    );
}

#[test]
fn next_free_vmid_is_one_past_the_highest() {
    let resources = vec![
        resource(100, "pm1", VmKind::Qemu, "a", "stopped"),
        resource(105, "pm1", VmKind::Qemu, "b", "stopped"),
        resource(103, "pm2", VmKind::Lxc, "c", "running"),
    ];
    assert_eq!(next_free_vmid(&resources), 106);
}

#[test]
fn next_free_vmid_starts_at_the_cluster_floor_when_empty() {
    assert_eq!(next_free_vmid(&[]), 100);
}

#[test]
fn next_free_vmid_saturates_at_the_id_ceiling() {
    let resources = vec![resource(u32::MAX, "pm1", VmKind::Qemu, "a", "stopped")];
    assert_eq!(next_free_vmid(&resources), u32::MAX);
}

#[tokio::test]
async fn start_submits_the_action_then_waits_for_running() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("stopped"));
    fx.cluster.push_status("stopped");
    fx.cluster.push_status("running");

    fx.driver.start("web-1").await.expect("starts");

    let calls = fx.cluster.calls();
    assert!(calls.contains(&ApiCall::Action {
        vmid: 101,
        action: VmAction::Start,
    }));
    assert!(fx.cluster.status_fetches() >= 2);
}

#[tokio::test]
async fn shutdown_waits_for_stopped() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    fx.cluster.push_status("running");
    fx.cluster.push_status("stopped");

    fx.driver.shutdown("web-1").await.expect("shuts down");

    assert!(fx.cluster.calls().contains(&ApiCall::Action {
        vmid: 101,
        action: VmAction::Shutdown,
    }));
}

#[tokio::test]
async fn destroy_deletes_only_after_confirmed_stop() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    fx.cluster.push_status("running");
    fx.cluster.push_status("stopped");

    fx.driver.destroy("web-1").await.expect("destroys");

    let calls = fx.cluster.calls();
    let stop_index = calls
        .iter()
        .position(|call| {
            matches!(
                call,
                ApiCall::Action {
                    action: VmAction::Stop,
                    ..
                }
            )
        })
        .expect("stop submitted");
    let delete_index = calls
        .iter()
        .position(|call| matches!(call, ApiCall::Delete(101)))
        .expect("delete submitted");
    assert!(stop_index < delete_index);
    assert_eq!(
        fx.events.names(),
        vec![
            String::from("destroying instance"),
            String::from("destroyed instance"),
        ]
    );
}

#[tokio::test]
async fn destroy_never_deletes_a_stuck_vm() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    fx.cluster.push_status("running");

    let result = fx.driver.destroy("web-1").await;

    assert!(matches!(result, Err(DriverError::Timeout { .. })));
    assert!(!fx.cluster.saw_delete(), "delete must never reach a running VM");
    assert_eq!(fx.events.names(), vec![String::from("destroying instance")]);
}

#[tokio::test]
async fn reconfigure_updates_the_resolved_vm() {
    let fx = fixture();
    fx.cluster.push_inventory(web_inventory("running"));
    let mut params = std::collections::BTreeMap::new();
    params.insert(String::from("cores"), String::from("4"));

    fx.driver
        .reconfigure("web-1", &params)
        .await
        .expect("reconfigures");

    assert!(fx.cluster.calls().contains(&ApiCall::UpdateConfig(101)));
}

#[tokio::test]
async fn list_instances_skips_unnamed_entries_and_classifies_addresses() {
    let fx = fixture();
    let mut inventory = web_inventory("running");
    inventory.push(resource(300, "pm2", VmKind::Lxc, "", "stopped"));
    fx.cluster.push_inventory(inventory);
    let mut config = std::collections::BTreeMap::new();
    config.insert(
        String::from("ipconfig0"),
        String::from("ip=192.168.1.5/24,gw=192.168.1.1"),
    );
    fx.cluster.set_config(101, config);

    let instances = fx.driver.list_instances().await.expect("lists");

    assert_eq!(instances.len(), 2);
    let web = instances.get("web-1").expect("named VM present");
    assert_eq!(web.status, "running");
    assert_eq!(web.private_ips.len(), 1);
    assert!(web.public_ips.is_empty());
    assert!(!instances.contains_key(""));
}

fn node(name: &str, status: &str) -> NodeEntry {
    NodeEntry {
        node: name.to_owned(),
        status: Some(status.to_owned()),
    }
}

#[tokio::test]
async fn list_locations_skips_nodes_that_are_not_online() {
    let fx = fixture();
    fx.cluster
        .set_nodes(vec![node("pm1", "online"), node("pm2", "offline")]);

    let locations = fx.driver.list_locations().await.expect("lists");

    assert_eq!(locations.len(), 1);
    assert!(locations.contains_key("pm1"));
    assert!(!locations.contains_key("pm2"));
}

#[tokio::test]
async fn list_images_queries_only_online_nodes() {
    let fx = fixture();
    fx.cluster
        .set_nodes(vec![node("pm1", "online"), node("pm2", "offline")]);
    fx.cluster.set_storage_content(
        "pm1",
        DEFAULT_STORAGE,
        vec![StorageItem {
            volid: String::from("local:vztmpl/debian-12.tar.zst"),
            content: Some(String::from("vztmpl")),
            format: None,
            size: Some(123_456_789),
        }],
    );

    let images = fx.driver.list_images(DEFAULT_STORAGE).await.expect("lists");

    assert_eq!(images.len(), 1);
    let volumes = images.get("pm1").expect("online node present");
    assert!(volumes.contains_key("local:vztmpl/debian-12.tar.zst"));
    let storage_calls: Vec<_> = fx
        .cluster
        .calls()
        .into_iter()
        .filter(|call| matches!(call, ApiCall::StorageContent { .. }))
        .collect();
    assert_eq!(
        storage_calls,
        vec![ApiCall::StorageContent {
            node: String::from("pm1"),
            storage: String::from(DEFAULT_STORAGE),
        }]
    );
}

#[tokio::test]
async fn create_rejects_options_without_a_template() {
    let fx = fixture();
    let options = VmOptions {
        name: String::from("web-1"),
        template: String::new(),
        clone: None,
    };
    let result = fx.driver.create(&options).await;
    assert!(matches!(
        result,
        Err(DriverError::InvalidInvocation { .. })
    ));
    assert!(fx.cluster.calls().is_empty(), "nothing may reach the cluster");
}
