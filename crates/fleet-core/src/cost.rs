//! Rough cost accounting against on-demand EC2 pricing.
//!
//! Used for reporting what a workload would have cost on a public cloud,
//! as an argument for the shared inventory. Prices are hourly on-demand
//! rates; the lookup picks the cheapest SKU that covers the requested
//! vCPU and memory.

/// An EC2-style machine SKU with an hourly on-demand price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sku {
    pub name: &'static str,
    pub vcpus: u32,
    /// Memory in GiB.
    pub mem_gib: f64,
    /// On-demand price in USD per hour.
    pub price_per_hour: f64,
}

/// On-demand price table, sorted by (memory, vcpus) ascending.
const PRICE_TABLE: &[Sku] = &[
    Sku { name: "t2.nano", vcpus: 1, mem_gib: 0.5, price_per_hour: 0.0067 },
    Sku { name: "t3.nano", vcpus: 2, mem_gib: 0.5, price_per_hour: 0.006 },
    Sku { name: "t2.micro", vcpus: 1, mem_gib: 1.0, price_per_hour: 0.0134 },
    Sku { name: "t3.micro", vcpus: 2, mem_gib: 1.0, price_per_hour: 0.012 },
    Sku { name: "t2.small", vcpus: 1, mem_gib: 2.0, price_per_hour: 0.0268 },
    Sku { name: "t3.small", vcpus: 2, mem_gib: 2.0, price_per_hour: 0.024 },
    Sku { name: "m3.medium", vcpus: 1, mem_gib: 3.75, price_per_hour: 0.079 },
    Sku { name: "t2.medium", vcpus: 2, mem_gib: 4.0, price_per_hour: 0.0536 },
    Sku { name: "t3.medium", vcpus: 2, mem_gib: 4.0, price_per_hour: 0.048 },
    Sku { name: "m3.large", vcpus: 2, mem_gib: 7.5, price_per_hour: 0.158 },
    Sku { name: "t2.large", vcpus: 2, mem_gib: 8.0, price_per_hour: 0.1072 },
    Sku { name: "t3.large", vcpus: 2, mem_gib: 8.0, price_per_hour: 0.096 },
    Sku { name: "m5.large", vcpus: 2, mem_gib: 8.0, price_per_hour: 0.115 },
    Sku { name: "m5d.large", vcpus: 2, mem_gib: 8.0, price_per_hour: 0.136 },
    Sku { name: "m4.large", vcpus: 2, mem_gib: 8.0, price_per_hour: 0.12 },
    Sku { name: "m3.xlarge", vcpus: 4, mem_gib: 15.0, price_per_hour: 0.315 },
    Sku { name: "t2.xlarge", vcpus: 4, mem_gib: 16.0, price_per_hour: 0.2144 },
    Sku { name: "t3.xlarge", vcpus: 4, mem_gib: 16.0, price_per_hour: 0.192 },
    Sku { name: "m5.xlarge", vcpus: 4, mem_gib: 16.0, price_per_hour: 0.23 },
    Sku { name: "m4.xlarge", vcpus: 4, mem_gib: 16.0, price_per_hour: 0.24 },
    Sku { name: "m5d.xlarge", vcpus: 4, mem_gib: 16.0, price_per_hour: 0.272 },
    Sku { name: "m3.2xlarge", vcpus: 8, mem_gib: 30.0, price_per_hour: 0.632 },
    Sku { name: "t2.2xlarge", vcpus: 8, mem_gib: 32.0, price_per_hour: 0.4288 },
    Sku { name: "t3.2xlarge", vcpus: 8, mem_gib: 32.0, price_per_hour: 0.384 },
    Sku { name: "m5.2xlarge", vcpus: 8, mem_gib: 32.0, price_per_hour: 0.46 },
    Sku { name: "m4.2xlarge", vcpus: 8, mem_gib: 32.0, price_per_hour: 0.48 },
    Sku { name: "m5d.2xlarge", vcpus: 8, mem_gib: 32.0, price_per_hour: 0.544 },
    Sku { name: "m5.4xlarge", vcpus: 16, mem_gib: 64.0, price_per_hour: 0.92 },
    Sku { name: "m4.4xlarge", vcpus: 16, mem_gib: 64.0, price_per_hour: 0.96 },
    Sku { name: "m5d.4xlarge", vcpus: 16, mem_gib: 64.0, price_per_hour: 1.088 },
    Sku { name: "m4.10xlarge", vcpus: 40, mem_gib: 160.0, price_per_hour: 2.4 },
    Sku { name: "m5.12xlarge", vcpus: 48, mem_gib: 192.0, price_per_hour: 2.76 },
    Sku { name: "m5d.12xlarge", vcpus: 48, mem_gib: 192.0, price_per_hour: 3.264 },
    Sku { name: "m4.16xlarge", vcpus: 64, mem_gib: 256.0, price_per_hour: 3.84 },
    Sku { name: "m5.24xlarge", vcpus: 96, mem_gib: 384.0, price_per_hour: 5.52 },
    Sku { name: "m5d.24xlarge", vcpus: 96, mem_gib: 384.0, price_per_hour: 6.528 },
];

/// Cheapest SKU covering the requested vCPU count and memory.
pub fn cheapest_matching(vcpus: u32, mem_gib: f64) -> Option<&'static Sku> {
    PRICE_TABLE
        .iter()
        .filter(|sku| sku.vcpus >= vcpus && sku.mem_gib >= mem_gib)
        .min_by(|a, b| a.price_per_hour.total_cmp(&b.price_per_hour))
}

/// Estimated on-demand cost in USD of running a matching machine for
/// `seconds`, or `None` if no SKU covers the request.
pub fn estimate_cost(vcpus: u32, mem_gib: f64, seconds: f64) -> Option<f64> {
    cheapest_matching(vcpus, mem_gib).map(|sku| seconds * sku.price_per_hour / 3600.0)
}
