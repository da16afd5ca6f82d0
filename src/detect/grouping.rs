//! Clustering of overlapping window hits into one box per person.
//!
//! Hits are partitioned by a similarity predicate (all four edges within
//! `eps` of the mean of the smaller sides), clusters with no more than
//! `group_threshold` members are dropped, survivors are averaged, and
//! clusters sitting inside a stronger one are removed.

use crate::detect::result::Detection;
use crate::frame::BoundingBox;

pub const DEFAULT_GROUP_EPS: f32 = 0.2;

/// Group raw window hits. A `group_threshold` of 0 returns the hits as-is.
pub fn group_detections(hits: &[Detection], group_threshold: usize, eps: f32) -> Vec<Detection> {
    if group_threshold == 0 || hits.is_empty() {
        return hits.to_vec();
    }

    let labels = partition(hits, eps);
    let clusters = labels.iter().copied().max().map_or(0, |m| m + 1);

    let mut sums = vec![[0f64; 4]; clusters];
    let mut counts = vec![0usize; clusters];
    let mut best = vec![f32::MIN; clusters];
    for (hit, &label) in hits.iter().zip(&labels) {
        let b = &hit.bounds;
        sums[label][0] += b.x as f64;
        sums[label][1] += b.y as f64;
        sums[label][2] += b.width as f64;
        sums[label][3] += b.height as f64;
        counts[label] += 1;
        best[label] = best[label].max(hit.weight);
    }

    let averaged: Vec<(Detection, usize)> = (0..clusters)
        .filter(|&c| counts[c] > group_threshold)
        .map(|c| {
            let n = counts[c] as f64;
            let bounds = BoundingBox::new(
                (sums[c][0] / n).round() as u32,
                (sums[c][1] / n).round() as u32,
                (sums[c][2] / n).round() as u32,
                (sums[c][3] / n).round() as u32,
            );
            (
                Detection {
                    bounds,
                    weight: best[c],
                },
                counts[c],
            )
        })
        .collect();

    averaged
        .iter()
        .enumerate()
        .filter(|(i, (inner, n1))| {
            !averaged.iter().enumerate().any(|(j, (outer, n2))| {
                *i != j
                    && (*n2 > (*n1).max(3) || *n1 < 3)
                    && contains_with_margin(&outer.bounds, &inner.bounds, eps)
            })
        })
        .map(|(_, (det, _))| *det)
        .collect()
}

/// Union-find partition of hits into similarity classes. Returns dense labels.
fn partition(hits: &[Detection], eps: f32) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..hits.len()).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            if similar(&hits[i].bounds, &hits[j].bounds, eps) {
                let a = find(&mut parent, i);
                let b = find(&mut parent, j);
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut dense = vec![usize::MAX; hits.len()];
    let mut next = 0;
    let mut labels = Vec::with_capacity(hits.len());
    for i in 0..hits.len() {
        let root = find(&mut parent, i);
        if dense[root] == usize::MAX {
            dense[root] = next;
            next += 1;
        }
        labels.push(dense[root]);
    }
    labels
}

fn similar(a: &BoundingBox, b: &BoundingBox, eps: f32) -> bool {
    let delta = eps as f64 * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn contains_with_margin(outer: &BoundingBox, inner: &BoundingBox, eps: f32) -> bool {
    let dx = (outer.width as f32 * eps).round() as i64;
    let dy = (outer.height as f32 * eps).round() as i64;
    let (ox, oy) = (outer.x as i64, outer.y as i64);
    let (ix, iy) = (inner.x as i64, inner.y as i64);
    ix >= ox - dx
        && iy >= oy - dy
        && ix + inner.width as i64 <= ox + outer.width as i64 + dx
        && iy + inner.height as i64 <= oy + outer.height as i64 + dy
}
