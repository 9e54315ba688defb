//! Weighted regression tree shared by the forest and the booster.
//!
//! Every sample carries a first-order term `g`, a second-order term `h` and a
//! sample weight `w`. A node's value is `sum(w*g) / (sum(w*h) + lambda)` and a
//! split is scored by the reduction of `-G^2 / (H + lambda)`. With `g = y`,
//! `h = 1`, `lambda = 0` this is a weighted-variance CART fitting the positive
//! fraction; with logistic gradients it is a Newton boosting step.

use rand::rngs::StdRng;
use rand::seq::index;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; `None` uses every allowed feature
    pub max_features: Option<usize>,
    pub lambda: f64,
}

/// Per-sample statistics the tree is fitted to
pub struct TreeTargets<'a> {
    pub grad: &'a [f64],
    pub hess: &'a [f64],
    pub weights: &'a [f64],
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

struct Builder<'a> {
    x: &'a [Vec<f64>],
    targets: &'a TreeTargets<'a>,
    allowed: &'a [usize],
    params: TreeParams,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fits on the rows named by `samples`; repeated indices count repeatedly.
    pub fn fit(
        x: &[Vec<f64>],
        samples: &[usize],
        targets: &TreeTargets<'_>,
        allowed: &[usize],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let builder = Builder {
            x,
            targets,
            allowed,
            params,
        };
        Self {
            root: builder.build(samples.to_vec(), 0, rng),
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    node = if v <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

impl Builder<'_> {
    fn sums(&self, samples: &[usize]) -> (f64, f64) {
        samples.iter().fold((0.0, 0.0), |(g, h), &i| {
            let w = self.targets.weights[i];
            (g + w * self.targets.grad[i], h + w * self.targets.hess[i])
        })
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.lambda;
        if denom > 0.0 {
            g * g / denom
        } else {
            0.0
        }
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.lambda;
        if denom > 0.0 {
            g / denom
        } else {
            0.0
        }
    }

    fn build(&self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> Node {
        let (g, h) = self.sums(&samples);
        let leaf = Node::Leaf(self.leaf_value(g, h));

        if depth >= self.params.max_depth || samples.len() < 2 * self.params.min_samples_leaf.max(1) {
            return leaf;
        }

        let Some(best) = self.best_split(&samples, g, h, rng) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left, depth + 1, rng)),
            right: Box::new(self.build(right, depth + 1, rng)),
        }
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        match self.params.max_features {
            Some(k) if k < self.allowed.len() => index::sample(rng, self.allowed.len(), k.max(1))
                .into_iter()
                .map(|i| self.allowed[i])
                .collect(),
            _ => self.allowed.to_vec(),
        }
    }

    fn best_split(&self, samples: &[usize], g_total: f64, h_total: f64, rng: &mut StdRng) -> Option<BestSplit> {
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent = self.score(g_total, h_total);
        let mut best: Option<BestSplit> = None;

        for feature in self.candidate_features(rng) {
            let mut order = samples.to_vec();
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                let w = self.targets.weights[i];
                g_left += w * self.targets.grad[i];
                h_left += w * self.targets.hess[i];

                let n_left = pos + 1;
                if n_left < min_leaf || order.len() - n_left < min_leaf {
                    continue;
                }
                let here = self.x[i][feature];
                let next = self.x[order[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let gain = self.score(g_left, h_left) + self.score(g_total - g_left, h_total - h_left) - parent;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
