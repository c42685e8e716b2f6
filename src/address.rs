//! Device-id / multi-dimensional-address translation.
//!
//! NPU ids are a mixed-radix encoding of their coordinates with the
//! least significant digit at dimension 0: for
//! `npus_count_per_dim = [n0, n1, ...]` the NPU at `[a0, a1, ...]` has
//! id `sum(a_i * prod(n_j for j < i))`. Switch nodes live above the
//! NPU range and are numbered by the [`SwitchTranslationUnit`].

use crate::{DeviceId, MultiDimAddress};

/// Decodes an NPU id into its per-dimension coordinates.
///
/// Panics when `id` is not an NPU id (switch ids have no coordinates
/// in NPU space).
pub fn translate_address(id: DeviceId, npus_count_per_dim: &[usize]) -> MultiDimAddress {
    let npus_count: usize = npus_count_per_dim.iter().product();
    assert!(
        id < npus_count,
        "device id {} is not an NPU (npus_count: {})",
        id,
        npus_count
    );

    let mut address = Vec::with_capacity(npus_count_per_dim.len());
    let mut leftover = id;
    for &n in npus_count_per_dim {
        address.push(leftover % n);
        leftover /= n;
    }
    address
}

/// Encodes per-dimension coordinates back into an NPU id.
///
/// Panics when any coordinate is out of its dimension's NPU range.
pub fn translate_address_back(address: &[usize], npus_count_per_dim: &[usize]) -> DeviceId {
    assert_eq!(address.len(), npus_count_per_dim.len());

    let mut id = 0;
    let mut stride = 1;
    for (dim, (&coord, &n)) in address.iter().zip(npus_count_per_dim).enumerate() {
        assert!(
            coord < n,
            "coordinate {} at dimension {} is not an NPU coordinate (npus count: {})",
            coord,
            dim,
            n
        );
        id += coord * stride;
        stride *= n;
    }
    id
}

/// Whether the address designates a switch node, i.e. some coordinate
/// sits at its dimension's NPU count.
pub fn is_switch_address(address: &[usize], npus_count_per_dim: &[usize]) -> bool {
    assert_eq!(address.len(), npus_count_per_dim.len());
    address.iter().zip(npus_count_per_dim).any(|(&a, &n)| a >= n)
}

/// Assigns stable global ids to the switch nodes introduced by switch
/// dimensions.
///
/// A switch of dimension `d` serves the whole sub-cluster spanning
/// dimensions `0..=d`, so its identity is the combination of the
/// coordinates *above* `d`: dimension `d` contributes
/// `prod(n_j for j > d)` switches. Ids are allocated above the NPU
/// range, outermost switch dimension first.
#[derive(Debug, Clone)]
pub struct SwitchTranslationUnit {
    npus_count_per_dim: Vec<usize>,
    switch_base_per_dim: Vec<Option<DeviceId>>,
    devices_count: usize,
}

impl SwitchTranslationUnit {
    pub fn new(npus_count_per_dim: &[usize], is_switch_dim: &[bool]) -> Self {
        assert_eq!(npus_count_per_dim.len(), is_switch_dim.len());

        let dims_count = npus_count_per_dim.len();
        let npus_count: usize = npus_count_per_dim.iter().product();

        let mut switch_base_per_dim = vec![None; dims_count];
        let mut next = npus_count;
        for dim in (0..dims_count).rev() {
            if is_switch_dim[dim] {
                switch_base_per_dim[dim] = Some(next);
                next += npus_count_per_dim[dim + 1..].iter().product::<usize>();
            }
        }

        SwitchTranslationUnit {
            npus_count_per_dim: npus_count_per_dim.to_vec(),
            switch_base_per_dim,
            devices_count: next,
        }
    }

    /// Total device count: NPUs plus every allocated switch node.
    #[inline]
    pub fn devices_count(&self) -> usize {
        self.devices_count
    }

    /// Global id of the switch node the address designates.
    ///
    /// Panics when called on an NPU address.
    pub fn translate_address_to_id(&self, address: &[usize]) -> DeviceId {
        assert_eq!(address.len(), self.npus_count_per_dim.len());

        let switch_dim = address
            .iter()
            .zip(&self.npus_count_per_dim)
            .position(|(&a, &n)| a >= n)
            .unwrap_or_else(|| panic!("address {:?} does not designate a switch", address));

        let base = self.switch_base_per_dim[switch_dim].unwrap_or_else(|| {
            panic!(
                "dimension {} of address {:?} is not a switch dimension",
                switch_dim, address
            )
        });
        assert_eq!(
            address[switch_dim], self.npus_count_per_dim[switch_dim],
            "switch coordinate must sit exactly at the dimension's NPU count"
        );

        // Coordinates below the switch dimension are not part of the
        // switch's identity; the ones above index into its block.
        let mut index = 0;
        let mut stride = 1;
        for dim in switch_dim + 1..address.len() {
            let coord = address[dim];
            let n = self.npus_count_per_dim[dim];
            assert!(coord < n, "coordinate {} out of range at dimension {}", coord, dim);
            index += coord * stride;
            stride *= n;
        }
        base + index
    }
}
