mod common;

use common::*;
use resect_core::prelude::*;

fn assert_close_to_cavity(mask: &Mask) {
    assert_close_to(mask, &ball(CAVITY_CENTER, CAVITY_RADIUS));
}

/// 体积相差不超过 20%, 质心相差不超过 2 个体素.
fn assert_close_to(mask: &Mask, truth: &Mask) {
    let expected = truth.count() as f64;
    let got = mask.count() as f64;
    assert!(
        (got - expected).abs() <= 0.2 * expected,
        "cavity volume {got}, expected about {expected}"
    );

    let c = mask.centroid().unwrap();
    let center = truth.centroid().unwrap();
    let off = c
        .iter()
        .zip(center.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt();
    assert!(off <= 2.0, "centroid {c:?} is {off} voxels off");
}

#[test]
fn test_synthetic_cavity_with_threshold_classifier() {
    init_logger();
    let scans = synthetic_scans();
    let sel = Selection::parse("L", "T").unwrap();
    let pipeline = ResectionPipeline::default();
    let state = pipeline
        .run(&scans, &sel, &ThresholdClassifier { threshold: -0.5 })
        .unwrap();

    assert!(state.growth.iterations >= 1);
    assert!(state.growth.last_delta <= pipeline.config().growth.convergence_voxels);
    // 腔体不会越过脑组织进入脑外 CSF.
    assert!(state.cavity().intersect(&state.outside).unwrap().is_blank());
    assert_close_to_cavity(state.cavity());

    let out = finalize(state.cavity(), scans.pre.space()).unwrap();
    assert!(out.space().same_as(scans.pre.space()));
    assert_close_to_cavity(&out);
}

#[test]
fn test_synthetic_cavity_with_gaussian_mixture() {
    init_logger();
    let scans = synthetic_scans();
    let sel = Selection::parse("l", "t").unwrap();
    let state = ResectionPipeline::default()
        .run(&scans, &sel, &GaussianMixtureClassifier::default())
        .unwrap();
    assert_close_to_cavity(state.cavity());
}

#[test]
fn test_postop_csf_seeds_the_change_map() {
    init_logger();
    let scans = scans_with(
        parcellation_with_ventricle(),
        &ball(CAVITY_CENTER, CAVITY_RADIUS),
    );
    let sel = Selection::parse("L", "T").unwrap();
    let state = ResectionPipeline::default()
        .run(&scans, &sel, &GaussianMixtureClassifier::default())
        .unwrap();

    let truth = ball(CAVITY_CENTER, CAVITY_RADIUS);
    let csf = &state.postop.csf;
    assert!(csf.subtract(&truth).unwrap().is_blank());
    assert!(csf.count() as f64 >= 0.9 * truth.count() as f64);
    // 脑室不再是差值图分类的类 2 先验.
    let vent = ball(VENTRICLE_CENTER, VENTRICLE_RADIUS);
    assert_eq!(state.prior.prior.count_where(|c| c == 2), csf.count());
    assert!(vent.positions().iter().all(|p| state.prior.prior[*p] != 2));
    assert_close_to_cavity(state.cavity());
}

#[test]
fn test_cavity_touching_brain_surface() {
    init_logger();
    let truth = ball(SURFACE_CAVITY_CENTER, SURFACE_CAVITY_RADIUS);
    let scans = scans_with(parcellation(), &truth);
    let sel = Selection::parse("L", "T").unwrap();
    let state = ResectionPipeline::default()
        .run(&scans, &sel, &ThresholdClassifier { threshold: -0.5 })
        .unwrap();

    // 贴着脑外 CSF 的那层体素由边界吸纳补回.
    let fresh = state.admission.boundary.subtract(&state.growth.base).unwrap();
    assert!(fresh.count() > 0);
    assert!(!state.growth.base.is_set((4, 16, 16)));
    assert!(state.cavity().is_set((4, 16, 16)));
    assert_close_to(state.cavity(), &truth.intersect(&state.brain).unwrap());
}

#[test]
fn test_wrong_lobe_finds_nothing() {
    init_logger();
    let scans = synthetic_scans();
    // 腔体在颞叶, 却只选了额叶.
    let sel = Selection::parse("L", "F").unwrap();
    let res = ResectionPipeline::default().run(&scans, &sel, &ThresholdClassifier { threshold: -0.5 });
    assert!(matches!(res, Err(ResectError::EmptyCavity)));
}

#[test]
fn test_observer_sees_every_iteration() {
    struct Count(usize);
    impl GrowthObserver for Count {
        fn on_iteration(&mut self, iteration: usize, _: &Mask, _: &Mask) {
            assert_eq!(iteration, self.0 + 1);
            self.0 = iteration;
        }
    }

    let scans = synthetic_scans();
    let sel = Selection::parse("L", "T").unwrap();
    let mut count = Count(0);
    let state = ResectionPipeline::default()
        .run_observed(&scans, &sel, &ThresholdClassifier { threshold: -0.5 }, &mut count)
        .unwrap();
    assert_eq!(count.0, state.growth.iterations);
}

#[test]
fn test_nifti_round_trip_of_final_mask() {
    let scans = synthetic_scans();
    let sel = Selection::parse("L", "T").unwrap();
    let state = ResectionPipeline::default()
        .run(&scans, &sel, &ThresholdClassifier { threshold: -0.5 })
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case_resection_mask.nii.gz");
    state.cavity().save(&path).unwrap();
    let back = Mask::open(&path).unwrap();
    assert_eq!(back.shape(), state.cavity().shape());
    assert!(back.space().same_as(state.cavity().space()));
    assert_eq!(back.data(), state.cavity().data());
}
