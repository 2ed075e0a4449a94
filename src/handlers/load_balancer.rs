use super::reverse_proxy::forward;
use crate::config::{create_weight_ranges, LoadBalanceStrategy, Upstream, WeightRange};
use crate::error::{FrontError, FrontResult};
use crate::http::{Request, Response};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Distributes requests across a fixed set of upstreams, either by simple
/// round robin or by weighted random sampling. The round-robin counter is a
/// single `AtomicUsize` shared across every thread dispatching through this
/// handler, so concurrent requests never race each other onto the same
/// index twice. Weighted sampling draws from a per-thread RNG: there is no
/// shared mutable RNG state to race on in the first place.
pub struct LoadBalancerHandler {
    strategy: LoadBalanceStrategy,
    upstreams: Vec<Upstream>,
    ranges: Vec<WeightRange>,
    next: AtomicUsize,
}

impl LoadBalancerHandler {
    pub fn new(strategy: LoadBalanceStrategy, upstreams: Vec<Upstream>) -> FrontResult<Self> {
        let ranges = if strategy == LoadBalanceStrategy::Weighted {
            let weights: Vec<f64> = upstreams.iter().map(|u| u.weight.unwrap_or(0.0)).collect();
            create_weight_ranges(&weights)
        } else {
            Vec::new()
        };
        Ok(Self {
            strategy,
            upstreams,
            ranges,
            next: AtomicUsize::new(0),
        })
    }

    fn pick(&self) -> FrontResult<&Upstream> {
        match self.strategy {
            LoadBalanceStrategy::RoundRobin => {
                let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.upstreams.len();
                Ok(&self.upstreams[idx])
            }
            LoadBalanceStrategy::Weighted => {
                let sample: f64 = rand::thread_rng().gen_range(0.0..1.0);
                self.ranges
                    .iter()
                    .position(|r| r.contains(sample))
                    .map(|idx| &self.upstreams[idx])
                    .ok_or(FrontError::NoRangeMatched { sample })
            }
        }
    }

    pub(super) fn pick_upstream(&self) -> FrontResult<Upstream> {
        self.pick().map(|u| u.clone())
    }

    pub fn handle_blocking(&self, request: &Request) -> Response {
        let upstream = match self.pick() {
            Ok(u) => u,
            Err(_) => return Response::from_raw(Vec::new()),
        };
        match forward(upstream, request) {
            Ok(raw) => Response::from_raw(raw),
            Err(_) => Response::from_raw(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(host: &str, port: u16, weight: Option<f64>) -> Upstream {
        Upstream {
            host: host.to_string(),
            port,
            weight,
        }
    }

    #[test]
    fn round_robin_cycles_through_every_upstream_in_order() {
        let handler = LoadBalancerHandler::new(
            LoadBalanceStrategy::RoundRobin,
            vec![
                upstream("a", 1, None),
                upstream("b", 2, None),
                upstream("c", 3, None),
            ],
        )
        .unwrap();

        let picked: Vec<&str> = (0..6)
            .map(|_| handler.pick().unwrap().host.as_str())
            .collect();
        assert_eq!(picked, ["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn weighted_strategy_always_resolves_to_some_upstream() {
        let handler = LoadBalancerHandler::new(
            LoadBalanceStrategy::Weighted,
            vec![upstream("a", 1, Some(0.25)), upstream("b", 2, Some(0.75))],
        )
        .unwrap();

        for _ in 0..100 {
            assert!(handler.pick().is_ok());
        }
    }

    #[test]
    fn weighted_distribution_is_proportional_to_configured_weights() {
        let handler = LoadBalancerHandler::new(
            LoadBalanceStrategy::Weighted,
            vec![upstream("a", 1, Some(0.1)), upstream("b", 2, Some(0.9))],
        )
        .unwrap();

        let mut b_count = 0;
        let trials = 2000;
        for _ in 0..trials {
            if handler.pick().unwrap().host == "b" {
                b_count += 1;
            }
        }
        let fraction = b_count as f64 / trials as f64;
        assert!(fraction > 0.7 && fraction < 1.0, "fraction was {fraction}");
    }
}
