//! Post-processing of detected keypoint sets
use sift_core::Keypoint;
use std::cmp::Ordering;

/// Lexicographic order on (x, y, scale, angle), the key used for duplicate removal
fn geometric_order(a: &Keypoint, b: &Keypoint) -> Ordering {
    a.x.total_cmp(&b.x)
        .then(a.y.total_cmp(&b.y))
        .then(a.scale.total_cmp(&b.scale))
        .then(a.angle.total_cmp(&b.angle))
}

/// Drop keypoints whose position, scale and angle exactly repeat an earlier one.
///
/// The surviving set is returned in geometric order.
pub fn remove_duplicates(keypoints: &mut Vec<Keypoint>) {
    keypoints.sort_by(geometric_order);
    keypoints.dedup_by(|a, b| geometric_order(a, b) == Ordering::Equal);
}

/// Keep the `n` strongest keypoints, strongest first.
///
/// Equal responses fall back to geometric order so the result does not depend
/// on the order detection produced them in.
pub fn retain_best(keypoints: &mut Vec<Keypoint>, n: usize) {
    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response).then_with(|| geometric_order(a, b)));
    keypoints.truncate(n);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(x: f32, y: f32, scale: f32, angle: f32, response: f32) -> Keypoint {
        Keypoint {
            response,
            ..Keypoint::new(x, y, scale, angle)
        }
    }

    #[test]
    fn test_remove_exact_duplicates() {
        let mut kps = vec![
            kp(5.0, 5.0, 2.0, 10.0, 0.1),
            kp(1.0, 2.0, 2.0, 10.0, 0.3),
            kp(5.0, 5.0, 2.0, 10.0, 0.1),
            kp(5.0, 5.0, 2.0, 20.0, 0.1),
        ];
        remove_duplicates(&mut kps);
        assert_eq!(kps.len(), 3);
        assert_eq!(kps[0].x, 1.0);
        assert_eq!(kps[1].angle, 10.0);
        assert_eq!(kps[2].angle, 20.0);
    }

    #[test]
    fn test_retain_best() {
        let mut kps = vec![
            kp(0.0, 0.0, 1.0, 0.0, 0.2),
            kp(1.0, 0.0, 1.0, 0.0, 0.9),
            kp(2.0, 0.0, 1.0, 0.0, 0.5),
            kp(3.0, 0.0, 1.0, 0.0, 0.7),
        ];
        retain_best(&mut kps, 2);
        assert_eq!(kps.len(), 2);
        assert_eq!(kps[0].response, 0.9);
        assert_eq!(kps[1].response, 0.7);
    }

    #[test]
    fn test_retain_best_ties_are_deterministic() {
        let a = vec![kp(3.0, 0.0, 1.0, 0.0, 0.5), kp(1.0, 0.0, 1.0, 0.0, 0.5), kp(2.0, 0.0, 1.0, 0.0, 0.5)];
        let mut b = a.clone();
        b.reverse();
        let mut a = a;
        retain_best(&mut a, 2);
        retain_best(&mut b, 2);
        assert_eq!(a, b);
        assert_eq!(a[0].x, 1.0);
    }

    #[test]
    fn test_retain_more_than_available() {
        let mut kps = vec![kp(0.0, 0.0, 1.0, 0.0, 0.2)];
        retain_best(&mut kps, 10);
        assert_eq!(kps.len(), 1);
    }
}
