//! Switch: one extra hub device with id `n`; every NPU attaches to it
//! bidirectionally and every route crosses it.

use std::sync::Arc;

use crate::bandwidth::Bandwidth;
use crate::basic::{materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct Switch {
    npus_count: usize,
    switch_id: DeviceId,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl Switch {
    pub fn new(
        npus_count: usize,
        bandwidth: Bandwidth,
        latency: Latency,
        mode: TopologyMode,
        faults: Arc<FaultTable>,
    ) -> Self {
        assert!(npus_count > 0);
        assert!(bandwidth.val() > 0);
        assert!(latency >= 0.0);

        let mut switch = Switch {
            npus_count,
            switch_id: npus_count,
            bandwidth,
            latency,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&switch, &switch.faults);
            switch.fabric = Some(fabric);
        }
        switch
    }

    #[inline]
    pub fn switch_id(&self) -> DeviceId {
        self.switch_id
    }
}

impl BasicTopology for Switch {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Switch
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count + 1
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        let mut policies = Vec::with_capacity(2 * self.npus_count);
        for i in 0..self.npus_count {
            policies.push(ConnectionPolicy::new(i, self.switch_id));
            policies.push(ConnectionPolicy::new(self.switch_id, i));
        }
        policies
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        assert!(
            src < self.npus_count && dst < self.npus_count,
            "route endpoint out of range"
        );
        if src == dst {
            vec![src]
        } else {
            vec![src, self.switch_id, dst]
        }
    }

    fn link_latency(&self) -> Latency {
        self.latency
    }

    fn link_bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    fn standalone_fabric(&self) -> Option<&Fabric> {
        self.fabric.as_ref()
    }
}
