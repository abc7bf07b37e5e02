//! Benchmarks for pressure-system assembly.
//!
//! Run with: `cargo bench --bench assembly_bench`
//!
//! Measures the per-step cost of scattering elemental stiffness into the
//! fixed CSR pattern and applying the Dirichlet projection.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lizzy::{MaterialStore, MeshData, PressureAssembler, SurfaceMesh};

fn setup(nx: usize, ny: usize) -> (SurfaceMesh, PressureAssembler, Vec<Option<f64>>) {
    let mesh = SurfaceMesh::from_data(MeshData::rectangle(1.0, 0.5, nx, ny)).unwrap();
    let mut store = MaterialStore::new();
    store
        .create_material("fabric", (1e-10, 1e-10, 1e-10), 0.5, 1.0)
        .unwrap();
    store.assign_material("fabric", "domain", None).unwrap();
    let props = store.resolve(&mesh).unwrap();
    let assembler = PressureAssembler::new(&mesh, &props, 0.1);

    let mut dirichlet = vec![None; mesh.n_nodes()];
    for &node in &mesh.boundaries["left_edge"] {
        dirichlet[node] = Some(1e5);
    }
    for &node in &mesh.boundaries["right_edge"] {
        dirichlet[node] = Some(0.0);
    }
    (mesh, assembler, dirichlet)
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    for (nx, ny) in [(20, 10), (40, 20), (80, 40)] {
        let (mesh, assembler, dirichlet) = setup(nx, ny);
        let mut k = assembler.new_matrix(&mesh);
        let mut b = vec![0.0; mesh.n_nodes()];

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", nx, ny)),
            &mesh,
            |bencher, mesh| {
                bencher.iter(|| {
                    assembler.assemble(mesh, &dirichlet, &mut k, &mut b);
                    black_box(&k);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_assembly);
criterion_main!(benches);
