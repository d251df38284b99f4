//! # Torus/Sphere Multi-Domain Example
//!
//! Meshes the region outside a torus and inside a sphere of radius √3 (the
//! `"+-"` sub-domain of the two functions), with the default criteria:
//! facets (30°, 0.2, 0.02) and cells (2.0, 0.4).
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --example torus_sphere -- [alpha] [lloyd] [out.mesh]
//! ```
//!
//! `alpha` is echoed back, `lloyd` is `true`/`false` (default `false`) and
//! an optional third argument writes the mesh in Medit format.

use implicit_mesh::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let alpha: f64 = args.first().and_then(|a| a.parse().ok()).unwrap_or(1.0);
    let lloyd = args.get(1).is_some_and(|a| a == "true" || a == "1");
    let output = args.get(2);

    println!("=================================================================");
    println!("Torus/Sphere Multi-Domain Mesh");
    println!("=================================================================");
    println!("alpha = {alpha}");
    println!("lloyd? {lloyd}");

    let functions: Vec<Box<dyn ScalarFunction>> = vec![
        Box::new(TorusFunction::default()),
        Box::new(SphereFunction::centered(3.0)),
    ];
    // The bounding sphere takes the squared radius.
    let domain = match LabeledDomain::from_patterns(
        functions,
        &["+-"],
        BoundingSphere::new(Point3::ORIGIN, 5.0 * 5.0),
        1.0e-4,
    ) {
        Ok(domain) => domain,
        Err(err) => {
            eprintln!("✗ Invalid domain: {err}");
            std::process::exit(1);
        }
    };

    let options = if lloyd {
        MeshOptions::lloyd()
    } else {
        MeshOptions::no_lloyd()
    };

    let start = Instant::now();
    let (mesh, report) = match generate_mesh_with_report(&domain, options) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("✗ Mesh generation failed: {err}");
            std::process::exit(1);
        }
    };
    println!("✓ Mesh generated in {:?}", start.elapsed());

    let stats = &report.statistics;
    println!();
    println!("Seeding:     {} seeds", report.seeding.interior_seeds + report.seeding.surface_seeds);
    println!("Refinement:  {} insertions ({} sweeps)", report.refinement.steps, report.refinement.sweeps);
    if let Some(lloyd) = &report.lloyd {
        println!(
            "Lloyd:       {} iterations, mean relative move {:.3e} (max {:.3e}), converged: {}",
            lloyd.iterations,
            lloyd.mean_relative_displacement,
            lloyd.max_displacement,
            lloyd.converged
        );
    }
    println!();
    println!("Vertices:    {}", stats.vertices);
    println!("Facets:      {}", stats.facets);
    println!("Cells:       {}", stats.cells);
    println!("Min facet angle:       {:.2}°", stats.min_facet_angle);
    println!("Max radius-edge ratio: {:.3}", stats.max_radius_edge_ratio);
    println!("Min normalized volume: {:.3}", stats.min_normalized_volume);

    if let Some(path) = output {
        let written = File::create(path)
            .map(BufWriter::new)
            .and_then(|mut writer| mesh.write_medit(&mut writer));
        match written {
            Ok(()) => println!("✓ Wrote {path}"),
            Err(err) => {
                eprintln!("✗ Cannot write {path}: {err}");
                std::process::exit(1);
            }
        }
    }
}
