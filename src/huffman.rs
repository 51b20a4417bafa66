//! Huffman coding of the vocabulary, for hierarchical softmax.

/// Root-to-leaf paths of a binary Huffman tree built over word counts.
///
/// The tree has `n - 1` internal nodes, numbered `0..n - 1`; the root is
/// node `n - 2`. Frequent words get short codes.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    codes: Vec<Vec<u8>>,
    points: Vec<Vec<u32>>,
}

/// Pops the smaller of the next unmerged leaf (scanning leaves from the least
/// frequent end) and the next merged node.
fn pop_min(count: &[u64], pos1: &mut usize, pos2: &mut usize) -> usize {
    if *pos1 > 0 && count[*pos1 - 1] < count[*pos2] {
        *pos1 -= 1;
        *pos1
    } else {
        *pos2 += 1;
        *pos2 - 1
    }
}

impl HuffmanTree {
    /// Builds the tree. `counts` must be sorted in descending order, as a
    /// `Vocabulary` is.
    pub fn build(counts: &[u64]) -> HuffmanTree {
        let n = counts.len();
        if n < 2 {
            return HuffmanTree {
                codes: vec![Vec::new(); n],
                points: vec![Vec::new(); n],
            };
        }
        debug_assert!(counts.windows(2).all(|w| w[0] >= w[1]));

        // Nodes 0..n are leaves, n..2n-1 are internal nodes in creation order.
        let mut count = vec![u64::MAX; n * 2];
        count[..n].copy_from_slice(counts);
        let mut binary = vec![0u8; n * 2]; // which child a node is of its parent (0 or 1)
        let mut parent_node = vec![0usize; n * 2];

        // Internal nodes are created in nondecreasing count order, so the
        // smallest two candidates are always at the front of one of the two
        // queues.
        let mut pos1 = n;
        let mut pos2 = n;
        for a in 0..(n - 1) {
            let min1i = pop_min(&count, &mut pos1, &mut pos2);
            let min2i = pop_min(&count, &mut pos1, &mut pos2);
            count[n + a] = count[min1i] + count[min2i];
            parent_node[min1i] = n + a;
            parent_node[min2i] = n + a;
            binary[min2i] = 1;
        }

        let root = n * 2 - 2;
        let mut codes = Vec::with_capacity(n);
        let mut points = Vec::with_capacity(n);
        for a in 0..n {
            let mut code = vec![];
            let mut point = vec![];
            let mut b = a;
            while b != root {
                code.push(binary[b]);
                b = parent_node[b];
                point.push((b - n) as u32);
            }
            code.reverse();
            point.reverse();
            codes.push(code);
            points.push(point);
        }
        HuffmanTree { codes, points }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, leaf: usize) -> &[u8] {
        &self.codes[leaf]
    }

    pub fn point(&self, leaf: usize) -> &[u32] {
        &self.points[leaf]
    }

    pub(crate) fn into_paths(self) -> impl Iterator<Item = (Vec<u8>, Vec<u32>)> {
        self.codes.into_iter().zip(self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(tree: &HuffmanTree) -> Vec<usize> {
        (0..tree.len()).map(|i| tree.code(i).len()).collect()
    }

    #[test]
    fn small_trees() {
        let tree = HuffmanTree::build(&[7]);
        assert!(tree.code(0).is_empty());

        let tree = HuffmanTree::build(&[5, 3]);
        assert_eq!(tree.code(0), &[1]);
        assert_eq!(tree.code(1), &[0]);
        assert_eq!(tree.point(0), &[0]);
        assert_eq!(tree.point(1), &[0]);
    }

    #[test]
    fn corpus_example() {
        // the, fox, quick, lazy, </s>, sleeps
        let tree = HuffmanTree::build(&[3, 3, 1, 1, 1, 1]);
        assert_eq!(lengths(&tree), [2, 2, 3, 3, 3, 3]);
        // Every path starts at the root.
        for i in 0..tree.len() {
            assert_eq!(tree.point(i)[0], 4);
        }
    }

    #[test]
    fn frequent_words_get_short_codes() {
        let counts = [1000, 400, 400, 90, 60, 60, 50, 20, 7, 7, 3, 2, 1, 1, 1];
        let tree = HuffmanTree::build(&counts);
        let len = lengths(&tree);
        for i in 0..counts.len() {
            for j in 0..counts.len() {
                if counts[i] > counts[j] {
                    assert!(len[i] <= len[j], "{i} vs {j}: {len:?}");
                }
            }
        }
    }

    #[test]
    fn codes_are_prefix_free_and_points_in_range() {
        let counts = [50, 40, 30, 20, 10, 10, 5, 5, 5, 1];
        let tree = HuffmanTree::build(&counts);
        for i in 0..tree.len() {
            assert_eq!(tree.code(i).len(), tree.point(i).len());
            assert!(tree.point(i).iter().all(|&p| (p as usize) < counts.len() - 1));
            for j in 0..tree.len() {
                if i != j {
                    assert!(!tree.code(j).starts_with(tree.code(i)));
                }
            }
        }

        // Kraft equality holds for a full binary tree.
        let kraft: f64 = (0..tree.len())
            .map(|i| 0.5f64.powi(tree.code(i).len() as i32))
            .sum();
        assert!((kraft - 1.0).abs() < 1e-12);
    }

    #[test]
    fn shared_prefixes_share_nodes() {
        let tree = HuffmanTree::build(&[10, 9, 8, 7, 6, 5, 4, 3]);
        for i in 0..tree.len() {
            for j in 0..tree.len() {
                let common = tree
                    .code(i)
                    .iter()
                    .zip(tree.code(j))
                    .take_while(|(a, b)| a == b)
                    .count();
                // Same branches so far means the same node at the next step.
                if common < tree.code(i).len() && common < tree.code(j).len() {
                    assert_eq!(tree.point(i)[..=common], tree.point(j)[..=common]);
                }
            }
        }
    }
}
