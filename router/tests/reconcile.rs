// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reconciler behavior against recording kernel-admin fakes.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use discovery::peers::Peer;
use ipnet::Ipv4Net;
use net::{InterfaceName, StackId, Vni};
use router::admin::{AdminError, FdbAdmin, LinkAdmin, RouteAdmin};
use router::config::StackMapping;
use router::fdb::FdbReconciler;
use router::routes::RouteReconciler;
use router::vtep::{VtepManager, VtepSpec};
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Records every kernel mutation as one line, `ip`/`bridge` style.
#[derive(Clone, Default)]
struct Recorder {
    ops: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.ops.lock().unwrap())
    }
}

impl RouteAdmin for Recorder {
    async fn add_route(
        &self,
        dest: Ipv4Net,
        via: Ipv4Addr,
        dev: &InterfaceName,
    ) -> Result<(), AdminError> {
        self.record(format!("route add {dest} via {via} dev {dev}"));
        Ok(())
    }

    async fn del_route(&self, dest: Ipv4Net, dev: &InterfaceName) -> Result<(), AdminError> {
        self.record(format!("route del {dest} dev {dev}"));
        Ok(())
    }
}

impl FdbAdmin for Recorder {
    async fn append_entry(&self, dev: &InterfaceName, dst: Ipv4Addr) -> Result<(), AdminError> {
        self.record(format!(
            "fdb append 00:00:00:00:00:00 dev {dev} dst {dst}"
        ));
        Ok(())
    }

    async fn delete_entry(&self, dev: &InterfaceName, dst: Ipv4Addr) -> Result<(), AdminError> {
        self.record(format!("fdb del 00:00:00:00:00:00 dev {dev} dst {dst}"));
        Ok(())
    }
}

/// A fake link table: one optional device plus its addresses.
#[derive(Clone, Default)]
struct FakeLinks {
    recorder: Recorder,
    state: Arc<Mutex<LinkState>>,
}

#[derive(Default)]
struct LinkState {
    index: Option<u32>,
    addrs: Vec<Ipv4Addr>,
}

impl FakeLinks {
    fn with_existing_device(index: u32, addrs: &[Ipv4Addr]) -> FakeLinks {
        let fake = FakeLinks::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.index = Some(index);
            state.addrs = addrs.to_vec();
        }
        fake
    }
}

impl LinkAdmin for FakeLinks {
    async fn link_index(&self, _name: &InterfaceName) -> Result<Option<u32>, AdminError> {
        Ok(self.state.lock().unwrap().index)
    }

    async fn create_vtep(
        &self,
        name: &InterfaceName,
        vni: Vni,
        local: Ipv4Addr,
    ) -> Result<(), AdminError> {
        self.recorder.record(format!(
            "link add {name} type vxlan id {vni} dstport 4789 local {local}"
        ));
        self.state.lock().unwrap().index = Some(7);
        Ok(())
    }

    async fn add_address(
        &self,
        index: u32,
        addr: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<(), AdminError> {
        self.recorder
            .record(format!("addr add {addr}/{prefix_len} dev #{index}"));
        self.state.lock().unwrap().addrs.push(addr);
        Ok(())
    }

    async fn addresses(&self, _index: u32) -> Result<Vec<Ipv4Addr>, AdminError> {
        Ok(self.state.lock().unwrap().addrs.clone())
    }

    async fn set_up(&self, index: u32) -> Result<(), AdminError> {
        self.recorder.record(format!("link set #{index} up"));
        Ok(())
    }

    async fn delete_link(&self, index: u32) -> Result<(), AdminError> {
        self.recorder.record(format!("link del #{index}"));
        let mut state = self.state.lock().unwrap();
        state.index = None;
        state.addrs.clear();
        Ok(())
    }
}

fn id(raw: &str) -> StackId {
    StackId::try_from(raw).unwrap()
}

fn vni100() -> Vni {
    Vni::new_checked(100).unwrap()
}

fn peer(raw: &str, host: Ipv4Addr) -> Peer {
    Peer::observed(id(raw), host, vni100(), Utc::now())
}

fn subnet(raw: &str) -> Ipv4Net {
    raw.parse().unwrap()
}

fn mappings() -> HashMap<StackId, StackMapping> {
    HashMap::from([(
        id("stack-b"),
        StackMapping {
            vxlan_ip: Ipv4Addr::new(10, 200, 0, 2),
            container_subnet: subnet("10.0.2.0/24"),
        },
    )])
}

fn device() -> InterfaceName {
    InterfaceName::for_vni(vni100())
}

#[tokio::test]
async fn one_peer_yields_one_route_and_one_fdb_entry() {
    let recorder = Recorder::default();
    let routes = RouteReconciler::new(recorder.clone(), device(), id("stack-a"), mappings());
    let fdb = FdbReconciler::new(recorder.clone(), device());

    let peers = vec![peer("stack-b", Ipv4Addr::new(192, 168, 1, 20))];
    let endpoints: BTreeSet<Ipv4Addr> = peers.iter().map(|p| p.host_ip).collect();

    fdb.update(&endpoints).await.unwrap();
    routes.update(&peers).await;

    assert_eq!(
        recorder.take(),
        vec![
            "fdb append 00:00:00:00:00:00 dev vxlan100 dst 192.168.1.20".to_string(),
            "route add 10.0.2.0/24 via 10.200.0.2 dev vxlan100".to_string(),
        ]
    );
}

#[tokio::test]
async fn republishing_the_same_peers_issues_no_kernel_commands() {
    let recorder = Recorder::default();
    let routes = RouteReconciler::new(recorder.clone(), device(), id("stack-a"), mappings());
    let fdb = FdbReconciler::new(recorder.clone(), device());

    let peers = vec![peer("stack-b", Ipv4Addr::new(192, 168, 1, 20))];
    let endpoints: BTreeSet<Ipv4Addr> = peers.iter().map(|p| p.host_ip).collect();

    fdb.update(&endpoints).await.unwrap();
    routes.update(&peers).await;
    recorder.take();

    fdb.update(&endpoints).await.unwrap();
    routes.update(&peers).await;
    assert!(recorder.take().is_empty());
}

#[tokio::test]
async fn a_moved_peer_swaps_its_fdb_entry_but_keeps_its_route() {
    let recorder = Recorder::default();
    let routes = RouteReconciler::new(recorder.clone(), device(), id("stack-a"), mappings());
    let fdb = FdbReconciler::new(recorder.clone(), device());

    let before = vec![peer("stack-b", Ipv4Addr::new(192, 168, 1, 20))];
    let endpoints: BTreeSet<Ipv4Addr> = before.iter().map(|p| p.host_ip).collect();
    fdb.update(&endpoints).await.unwrap();
    routes.update(&before).await;
    recorder.take();

    // stack-b reappears at a new underlay address; its overlay addressing
    // (and therefore its route) is unchanged
    let after = vec![peer("stack-b", Ipv4Addr::new(192, 168, 1, 99))];
    let endpoints: BTreeSet<Ipv4Addr> = after.iter().map(|p| p.host_ip).collect();
    fdb.update(&endpoints).await.unwrap();
    routes.update(&after).await;

    assert_eq!(
        recorder.take(),
        vec![
            "fdb del 00:00:00:00:00:00 dev vxlan100 dst 192.168.1.20".to_string(),
            "fdb append 00:00:00:00:00:00 dev vxlan100 dst 192.168.1.99".to_string(),
        ]
    );
}

#[tokio::test]
async fn an_unmapped_peer_causes_no_mutation() {
    let recorder = Recorder::default();
    let routes = RouteReconciler::new(recorder.clone(), device(), id("stack-a"), mappings());

    routes
        .update(&[peer("stranger", Ipv4Addr::new(192, 168, 1, 50))])
        .await;

    assert!(recorder.take().is_empty());
    assert!(routes.tracked().await.is_empty());
}

#[tokio::test]
async fn a_departed_peer_loses_route_and_fdb_entry() {
    let recorder = Recorder::default();
    let routes = RouteReconciler::new(recorder.clone(), device(), id("stack-a"), mappings());
    let fdb = FdbReconciler::new(recorder.clone(), device());

    let peers = vec![peer("stack-b", Ipv4Addr::new(192, 168, 1, 20))];
    let endpoints: BTreeSet<Ipv4Addr> = peers.iter().map(|p| p.host_ip).collect();
    fdb.update(&endpoints).await.unwrap();
    routes.update(&peers).await;
    recorder.take();

    fdb.update(&BTreeSet::new()).await.unwrap();
    routes.update(&[]).await;

    assert_eq!(
        recorder.take(),
        vec![
            "fdb del 00:00:00:00:00:00 dev vxlan100 dst 192.168.1.20".to_string(),
            "route del 10.0.2.0/24 dev vxlan100".to_string(),
        ]
    );
    assert!(routes.tracked().await.is_empty());
    assert!(fdb.tracked().await.is_empty());
}

#[tokio::test]
async fn vtep_creation_programs_device_address_and_state() {
    let links = FakeLinks::default();
    let vtep = VtepManager::new(
        links.clone(),
        VtepSpec::new(
            vni100(),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(10, 200, 0, 1),
        ),
    );

    vtep.ensure().await.unwrap();

    assert_eq!(
        links.recorder.take(),
        vec![
            "link add vxlan100 type vxlan id 100 dstport 4789 local 192.168.1.10".to_string(),
            "addr add 10.200.0.1/24 dev #7".to_string(),
            "link set #7 up".to_string(),
        ]
    );
}

#[tokio::test]
async fn an_existing_device_is_adjusted_not_recreated() {
    let links = FakeLinks::with_existing_device(3, &[Ipv4Addr::new(10, 200, 0, 1)]);
    let vtep = VtepManager::new(
        links.clone(),
        VtepSpec::new(
            vni100(),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(10, 200, 0, 1),
        ),
    );

    vtep.ensure().await.unwrap();

    // address already present: only the UP adjustment happens
    assert_eq!(links.recorder.take(), vec!["link set #3 up".to_string()]);
}

#[tokio::test]
async fn an_existing_device_missing_its_address_gets_it_added() {
    let links = FakeLinks::with_existing_device(3, &[]);
    let vtep = VtepManager::new(
        links.clone(),
        VtepSpec::new(
            vni100(),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(10, 200, 0, 1),
        ),
    );

    vtep.ensure().await.unwrap();

    assert_eq!(
        links.recorder.take(),
        vec![
            "addr add 10.200.0.1/24 dev #3".to_string(),
            "link set #3 up".to_string(),
        ]
    );
}

#[tokio::test]
async fn teardown_deletes_the_device_once() {
    let links = FakeLinks::with_existing_device(3, &[]);
    let vtep = VtepManager::new(
        links.clone(),
        VtepSpec::new(
            vni100(),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(10, 200, 0, 1),
        ),
    );

    vtep.teardown().await.unwrap();
    vtep.teardown().await.unwrap();

    assert_eq!(links.recorder.take(), vec!["link del #3".to_string()]);
}
