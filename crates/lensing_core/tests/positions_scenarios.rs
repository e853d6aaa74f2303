use anyhow::{ensure, Context, Result};
use lensing_core::mass_profiles::{Isothermal, MassSheet};
use lensing_core::{
    Coordinate, FlatLambdaCdm, Galaxy, Grid2D, LensError, LensSystem, PositionsSolver,
    SolverConfig, Tracer,
};

const FINEST_PIXEL_SCALE: f64 = 0.1 / 128.0;

fn solver() -> Result<PositionsSolver> {
    let grid = Grid2D::uniform((50, 50), 0.1)?;
    Ok(PositionsSolver::new(grid, SolverConfig::default())?)
}

fn single_lens(profile: Isothermal) -> Result<Tracer> {
    let galaxies = vec![Galaxy::new(0.5).with_profile(profile), Galaxy::new(1.0)];
    Ok(Tracer::from_galaxies(galaxies, &FlatLambdaCdm::planck15())?)
}

fn assert_near(actual: Coordinate, expected: Coordinate, tolerance: f64) {
    assert!(
        actual.distance(&expected) <= tolerance,
        "{actual} is {} from {expected}",
        actual.distance(&expected)
    );
}

#[test]
fn elliptical_lens_produces_four_images_that_trace_back() -> Result<()> {
    let tracer = single_lens(Isothermal::ellipse(Coordinate::origin(), 1.2, 0.8, 45.0))?;
    let target = Coordinate::new(0.05, 0.05);
    let solver = solver()?;
    let solutions = solver.solve_with_magnifications(&tracer, target, 1)?;

    assert_eq!(solutions.len(), 4, "solutions: {solutions:?}");
    let expected = [
        (Coordinate::new(-0.76367, -0.76445), -4.1386),
        (Coordinate::new(-0.43711, 1.17617), 8.5774),
        (Coordinate::new(0.86367, 0.86445), -10.2110),
        (Coordinate::new(1.17617, -0.43711), 8.5774),
    ];
    for (solution, (position, mu)) in solutions.iter().zip(expected) {
        assert_near(solution.coordinate, position, 3.0 * FINEST_PIXEL_SCALE);
        let back = tracer.trace(solution.coordinate, 1)?;
        assert!(back.distance(&target) <= 1e-3);
        assert!(solution.residual <= 1e-3);
        let magnification = solution.magnification.context("magnification missing")?;
        assert!(
            (magnification - mu).abs() / mu.abs() < 0.03,
            "μ = {magnification}, expected about {mu}"
        );
    }

    let magnifications: Vec<f64> = solutions.iter().filter_map(|s| s.magnification).collect();
    ensure!(magnifications.iter().any(|&mu| mu > 0.0));
    ensure!(magnifications.iter().any(|&mu| mu < 0.0));
    Ok(())
}

#[test]
fn images_respect_the_mirror_symmetry_of_the_lens() -> Result<()> {
    // Axes along the diagonals and a source on the diagonal: swapping y and x
    // maps the image set onto itself.
    let tracer = single_lens(Isothermal::ellipse(Coordinate::origin(), 1.2, 0.8, 45.0))?;
    let images = solver()?.solve(&tracer, Coordinate::new(0.05, 0.05), 1)?;
    for image in &images {
        let mirrored = Coordinate::new(image.x, image.y);
        let closest = images
            .iter()
            .map(|other| other.distance(&mirrored))
            .fold(f64::INFINITY, f64::min);
        assert!(closest <= 3.0 * FINEST_PIXEL_SCALE, "{image} has no mirror image");
    }
    Ok(())
}

#[test]
fn unrotated_ellipse_also_gives_four_images() -> Result<()> {
    let tracer = single_lens(Isothermal::ellipse(Coordinate::origin(), 1.2, 0.8, 0.0))?;
    let report = solver()?.solve_with_report(&tracer, Coordinate::new(0.05, 0.05), 1)?;
    assert_eq!(report.solutions.len(), 4);
    assert!(report.accepted_cells >= 4);
    let expected = [
        Coordinate::new(-1.08086, 0.52305),
        Coordinate::new(-0.45039, 1.10352),
        Coordinate::new(-0.22695, -1.07227),
        Coordinate::new(1.26133, 0.29648),
    ];
    for (solution, position) in report.solutions.iter().zip(expected) {
        assert_near(solution.coordinate, position, 3.0 * FINEST_PIXEL_SCALE);
    }
    Ok(())
}

#[test]
fn isothermal_sphere_images_match_the_analytic_solution() -> Result<()> {
    let tracer = single_lens(Isothermal::sphere(Coordinate::origin(), 1.6))?;
    let solver = solver()?;
    let images = solver.solve(&tracer, Coordinate::new(0.0, 0.3), 1)?;
    assert_eq!(images.len(), 2);
    assert_near(images[0], Coordinate::new(0.0, -1.3), 3.0 * FINEST_PIXEL_SCALE);
    assert_near(images[1], Coordinate::new(0.0, 1.9), 3.0 * FINEST_PIXEL_SCALE);

    let magnifications = solver.magnification_via_hessian(&tracer, &images, 1)?;
    assert_eq!(magnifications.len(), 2);
    for (image, mu) in images.iter().zip(&magnifications) {
        let expected = 1.0 / (1.0 - 1.6 / image.norm());
        assert!((mu - expected).abs() / expected.abs() < 1e-3);
    }
    assert!(magnifications[0] < 0.0 && magnifications[1] > 0.0);
    Ok(())
}

#[test]
fn demagnified_counter_image_is_found() -> Result<()> {
    // Off-centre source: the inner image at (|β| - θ_E) β̂ is squeezed three
    // times tangentially, so grid centres next to it trace well away from β.
    let tracer = single_lens(Isothermal::sphere(Coordinate::origin(), 1.6))?;
    let solver = PositionsSolver::new(Grid2D::uniform((80, 80), 0.1)?, SolverConfig::default())?;
    let target = Coordinate::new(0.0, 1.2);
    let solutions = solver.solve_with_magnifications(&tracer, target, 1)?;
    assert_eq!(solutions.len(), 2, "solutions: {solutions:?}");

    for (position, mu) in [
        (Coordinate::new(0.0, -0.4), -1.0 / 3.0),
        (Coordinate::new(0.0, 2.8), 7.0 / 3.0),
    ] {
        let solution = solutions
            .iter()
            .min_by(|a, b| {
                a.coordinate
                    .distance(&position)
                    .total_cmp(&b.coordinate.distance(&position))
            })
            .context("no solutions")?;
        assert_near(solution.coordinate, position, 3.0 * FINEST_PIXEL_SCALE);
        assert!(tracer.trace(solution.coordinate, 1)?.distance(&target) <= 1e-3);
        let magnification = solution.magnification.context("magnification missing")?;
        assert!(
            (magnification - mu).abs() / mu.abs() < 1e-3,
            "μ = {magnification}, expected {mu}"
        );
    }
    Ok(())
}

#[test]
fn nearer_planes_ignore_mass_at_or_beyond_them() -> Result<()> {
    let cosmology = FlatLambdaCdm::planck15();
    let main = Galaxy::new(0.5).with_profile(Isothermal::sphere(Coordinate::origin(), 1.0));
    let secondary = Galaxy::new(1.0).with_profile(Isothermal::sphere(Coordinate::new(0.1, -0.1), 0.3));
    let with_secondary = Tracer::from_galaxies(
        vec![main.clone(), secondary, Galaxy::new(2.0)],
        &cosmology,
    )?;
    let without_secondary = Tracer::from_galaxies(
        vec![main, Galaxy::new(1.0), Galaxy::new(2.0)],
        &cosmology,
    )?;
    let solver = solver()?;

    let near_target = Coordinate::new(0.0, 0.2);
    let near_with = solver.solve(&with_secondary, near_target, 1)?;
    let near_without = solver.solve(&without_secondary, near_target, 1)?;
    assert_eq!(near_with, near_without);
    assert_eq!(near_with.len(), 2);

    // On plane 1 the main lens acts as an SIS of radius β₀₁ θ_E.
    let beta = with_secondary.scaling_factor(0, 1);
    assert!((beta - 0.674).abs() < 0.01);
    assert_near(near_with[0], Coordinate::new(0.0, 0.2 - beta), 3.0 * FINEST_PIXEL_SCALE);
    assert_near(near_with[1], Coordinate::new(0.0, 0.2 + beta), 3.0 * FINEST_PIXEL_SCALE);

    let far_target = Coordinate::new(0.05, 0.1);
    let far_with = solver.solve(&with_secondary, far_target, 2)?;
    let far_without = solver.solve(&without_secondary, far_target, 2)?;
    assert!(far_with.len() >= 2);
    assert_ne!(far_with, far_without);
    for image in &far_with {
        assert!(with_secondary.trace(*image, 2)?.distance(&far_target) <= 1e-3);
    }
    Ok(())
}

#[test]
fn repeated_and_parallel_solves_are_identical() -> Result<()> {
    let tracer = single_lens(Isothermal::ellipse(Coordinate::origin(), 1.2, 0.8, 45.0))?;
    let target = Coordinate::new(0.05, 0.05);
    let parallel = solver()?;
    let serial = PositionsSolver::new(
        Grid2D::uniform((50, 50), 0.1)?,
        SolverConfig {
            parallel: false,
            ..SolverConfig::default()
        },
    )?;

    let first = parallel.solve(&tracer, target, 1)?;
    assert_eq!(first, parallel.solve(&tracer, target, 1)?);
    assert_eq!(first, serial.solve(&tracer, target, 1)?);
    Ok(())
}

#[test]
fn degenerate_configurations_are_rejected_at_construction() -> Result<()> {
    let grid = Grid2D::uniform((50, 50), 0.1)?;
    for config in [
        SolverConfig {
            upscale_factor: 1,
            ..SolverConfig::default()
        },
        SolverConfig {
            pixel_scale_precision: 0.0,
            ..SolverConfig::default()
        },
        SolverConfig {
            pixel_scale_precision: -1e-3,
            ..SolverConfig::default()
        },
    ] {
        let err = PositionsSolver::new(grid.clone(), config).expect_err("config should be rejected");
        assert!(matches!(err, LensError::InvalidConfig(_)), "unexpected error {err}");
    }
    Ok(())
}

#[test]
fn out_of_range_planes_are_errors() -> Result<()> {
    let tracer = single_lens(Isothermal::sphere(Coordinate::origin(), 1.6))?;
    let solver = solver()?;
    let err = solver
        .solve(&tracer, Coordinate::origin(), 2)
        .expect_err("plane 2 does not exist");
    assert!(matches!(
        err,
        LensError::InvalidPlaneIndex {
            index: 2,
            plane_count: 2
        }
    ));
    Ok(())
}

#[test]
fn a_source_far_outside_the_grid_has_no_images() -> Result<()> {
    let tracer = single_lens(Isothermal::sphere(Coordinate::origin(), 1.6))?;
    let images = solver()?.solve(&tracer, Coordinate::new(30.0, 30.0), 1)?;
    assert!(images.is_empty());
    Ok(())
}

#[test]
fn critical_mass_sheet_has_degenerate_magnification() -> Result<()> {
    let galaxies = vec![
        Galaxy::new(0.5).with_profile(MassSheet {
            centre: Coordinate::origin(),
            kappa: 1.0,
        }),
        Galaxy::new(1.0),
    ];
    let tracer = Tracer::from_galaxies(galaxies, &FlatLambdaCdm::planck15())?;
    let position = Coordinate::new(0.3, -0.2);
    let err = solver()?
        .magnification_via_hessian(&tracer, &[position], 1)
        .expect_err("κ = 1 is degenerate");
    match err {
        LensError::DegenerateMagnification {
            coordinate,
            plane_index,
            ..
        } => {
            assert_eq!(coordinate, position);
            assert_eq!(plane_index, 1);
        }
        other => panic!("unexpected error {other}"),
    }
    Ok(())
}

#[test]
fn lens_models_and_settings_load_from_json() -> Result<()> {
    let galaxies: Vec<Galaxy> = serde_json::from_str(
        r#"[
            {"redshift": 0.5, "mass_profiles": [
                {"type": "isothermal", "centre": {"y": 0.0, "x": 0.0},
                 "einstein_radius": 1.6, "axis_ratio": 1.0}
            ]},
            {"redshift": 1.0}
        ]"#,
    )?;
    let tracer = Tracer::from_galaxies(galaxies, &FlatLambdaCdm::planck15())?;
    let config = SolverConfig::from_json_str(r#"{"parallel": false}"#)?;
    let solver = PositionsSolver::new(Grid2D::uniform((50, 50), 0.1)?, config)?;
    let images = solver.solve(&tracer, Coordinate::new(0.0, 0.3), 1)?;
    assert_eq!(images.len(), 2);
    Ok(())
}
