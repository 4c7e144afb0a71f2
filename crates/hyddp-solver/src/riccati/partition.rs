//! Partitioned backward pass
//!
//! The node range is split into contiguous partitions, one worker each:
//!
//! ```text
//!  partition 0        partition 1        partition 2 (terminal)
//! [0 ......... b1) ← [b1 ....... b2) ← [b2 ............ N]
//!              CostToGo(b1)      CostToGo(b2)
//! ```
//!
//! Every worker projects its own nodes first, then waits for the cost-to-go
//! of its right neighbour and runs its recursion strictly backward. A failure
//! anywhere is forwarded to the left as [`BoundaryMessage::Abort`].

use std::sync::mpsc::{self, Receiver, Sender};

use rayon::ThreadPool;
use tracing::{debug, trace};

use crate::config::Algorithm;
use crate::lq::LinearQuadraticApproximation;
use crate::riccati::{
    backward_recursion, project_range, BackwardPassSolution, CostToGo, PartitionSolution, Regularization,
    RiccatiError,
};

/// Contiguous node range `[begin, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub begin: usize,
    pub end: usize,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

/// Message passed from a partition to its left neighbour
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryMessage {
    /// Cost-to-go of the sender's first node
    CostToGo(CostToGo),
    /// The sender (or a partition to its right) failed
    Abort,
}

/// Split the nodes at `times` by the partitioning times
///
/// Partition `p` holds the nodes with `T_p <= t < T_{p+1}`; nodes outside
/// `[T_0, T_last]` fall into the first or last partition. Empty partitions
/// are dropped.
pub fn partition_nodes(times: &[f64], partitioning_times: &[f64]) -> Vec<Partition> {
    if times.is_empty() {
        return Vec::new();
    }
    let interior = if partitioning_times.len() > 2 {
        &partitioning_times[1..partitioning_times.len() - 1]
    } else {
        &[][..]
    };

    let mut partitions = Vec::with_capacity(interior.len() + 1);
    let mut begin = 0;
    for &boundary in interior {
        let end = begin + times[begin..].partition_point(|&t| t < boundary);
        if end > begin {
            partitions.push(Partition { begin, end });
        }
        begin = end;
    }
    if times.len() > begin {
        partitions.push(Partition {
            begin,
            end: times.len(),
        });
    }
    partitions
}

/// Backward pass over all partitions, one worker per partition on `pool`
///
/// The pool must hold at least as many threads as there are partitions:
/// workers block while waiting for their right neighbour.
pub fn partitioned_backward_pass(
    pool: &ThreadPool,
    partitions: &[Partition],
    lq: &LinearQuadraticApproximation,
    algorithm: Algorithm,
    regularization: &Regularization,
) -> Result<BackwardPassSolution, RiccatiError> {
    let num_partitions = partitions.len();
    let mut senders: Vec<Option<Sender<BoundaryMessage>>> = Vec::with_capacity(num_partitions);
    let mut receivers: Vec<Option<Receiver<BoundaryMessage>>> = Vec::with_capacity(num_partitions);
    for _ in 1..num_partitions {
        let (tx, rx) = mpsc::channel();
        senders.push(Some(tx));
        receivers.push(Some(rx));
    }

    let mut results: Vec<Option<Result<PartitionSolution, RiccatiError>>> = vec![None; num_partitions];
    pool.scope(|scope| {
        for (index, slot) in results.iter_mut().enumerate() {
            let partition = partitions[index];
            // Channel `i` carries messages from partition `i + 1` to partition `i`
            let from_right = receivers.get_mut(index).and_then(Option::take);
            let to_left = if index > 0 { senders[index - 1].take() } else { None };
            scope.spawn(move |_| {
                *slot = Some(run_partition(
                    index,
                    partition,
                    lq,
                    algorithm,
                    regularization,
                    from_right,
                    to_left,
                ));
            });
        }
    });

    let mut nodes = Vec::with_capacity(lq.nodes.len());
    let mut descent = Vec::with_capacity(lq.nodes.len());
    let mut first_error = None;
    // Rightmost failure is the origin; everything left of it only aborted
    for result in results.into_iter().rev() {
        match result {
            Some(Ok(solution)) => {
                nodes.push(solution.nodes);
                descent.push(solution.descent);
            }
            Some(Err(RiccatiError::Aborted)) | None => {
                if first_error.is_none() {
                    first_error = Some(RiccatiError::Aborted);
                }
            }
            Some(Err(err)) => {
                if matches!(first_error, None | Some(RiccatiError::Aborted)) {
                    first_error = Some(err);
                }
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    nodes.reverse();
    descent.reverse();
    let nodes: Vec<_> = nodes.into_iter().flatten().collect();
    let expected_descent = descent.into_iter().flatten().sum();
    Ok(BackwardPassSolution {
        nodes,
        expected_descent,
    })
}

fn run_partition(
    index: usize,
    partition: Partition,
    lq: &LinearQuadraticApproximation,
    algorithm: Algorithm,
    regularization: &Regularization,
    from_right: Option<Receiver<BoundaryMessage>>,
    to_left: Option<Sender<BoundaryMessage>>,
) -> Result<PartitionSolution, RiccatiError> {
    let abort = |to_left: &Option<Sender<BoundaryMessage>>| {
        if let Some(tx) = to_left {
            // Left neighbour may already be gone
            let _ = tx.send(BoundaryMessage::Abort);
        }
    };

    let models = match project_range(lq, partition.begin, partition.end) {
        Ok(models) => models,
        Err(err) => {
            abort(&to_left);
            return Err(err);
        }
    };

    let downstream = match from_right {
        None => None,
        Some(rx) => match rx.recv() {
            Ok(BoundaryMessage::CostToGo(cost_to_go)) => Some(cost_to_go),
            Ok(BoundaryMessage::Abort) | Err(_) => {
                trace!(partition = index, "draining after abort");
                abort(&to_left);
                return Err(RiccatiError::Aborted);
            }
        },
    };

    match backward_recursion(algorithm, lq, &models, partition.len(), downstream, regularization) {
        Ok(solution) => {
            if let (Some(tx), Some(first)) = (&to_left, solution.nodes.first()) {
                let _ = tx.send(BoundaryMessage::CostToGo(first.cost_to_go.clone()));
            }
            debug!(
                partition = index,
                begin = partition.begin,
                end = partition.end,
                "partition backward pass done"
            );
            Ok(solution)
        }
        Err(err) => {
            abort(&to_left);
            Err(err)
        }
    }
}
