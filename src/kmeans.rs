/// Groups word vectors into `classes` clusters by K-means, using dot-product
/// similarity with unit-length class centers. Returns the class of each word.
///
/// Word `c` starts in class `c % classes`; ten rounds are run.
pub fn word_classes(embeddings: &[f32], size: usize, classes: usize) -> Vec<usize> {
    assert!(classes > 0);
    let vocab_size = embeddings.len() / size;
    let mut centcn = vec![0u32; classes];
    let mut cl: Vec<usize> = (0..vocab_size).map(|a| a % classes).collect();
    let mut cent: Vec<f32> = vec![0.0; classes * size];

    let iter = 10;
    for _ in 0..iter {
        cent.fill(0.0);
        centcn.fill(1);

        // Set cent[c] = sum of vectors in class c, centcn[c] = number of vectors in class c + 1
        for (c, row) in embeddings.chunks_exact(size).enumerate() {
            for (x, &e) in cent[size * cl[c]..][..size].iter_mut().zip(row) {
                *x += e;
            }
            centcn[cl[c]] += 1;
        }

        // Set cent[c] = center of class c, normalized to length 1
        for (center, &n) in cent.chunks_exact_mut(size).zip(&centcn) {
            for x in center.iter_mut() {
                *x /= n as f32;
            }
            let closev = center.iter().map(|x| x * x).sum::<f32>().sqrt();
            if closev > 0.0 {
                for x in center.iter_mut() {
                    *x /= closev;
                }
            }
        }

        // Move vectors to nearest class (by dot-product similarity with center of class).
        for (c, row) in embeddings.chunks_exact(size).enumerate() {
            let mut closev = f32::NEG_INFINITY;
            let mut closeid = 0;
            for (d, center) in cent.chunks_exact(size).enumerate() {
                let x = center.iter().zip(row).map(|(a, b)| a * b).sum::<f32>();
                if x > closev {
                    closev = x;
                    closeid = d;
                }
            }
            cl[c] = closeid;
        }
    }
    cl
}
