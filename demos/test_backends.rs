// demos/test_backends.rs

use dense_decomp::{DenseLinalg, EigenvectorRequest, Matrix};
use ndarray::array;

fn main() {
    let linalg = DenseLinalg::new();

    // Rotation by 90 degrees: eigenvalues are +i and -i
    let rotation = Matrix::from(array![[0.0_f64, -1.0], [1.0, 0.0]]);
    let pairs = linalg
        .geev(&rotation, EigenvectorRequest::Right)
        .expect("geev failed");
    println!("Eigenvalues: {:?}", pairs.values().as_c64());

    let a = Matrix::from(array![[4.0_f64, 1.0], [1.0, 3.0]]);
    let b = Matrix::from(array![[1.0_f64], [2.0]]);
    let x = linalg.solve(&a, &b).expect("solve failed");
    println!("Backend solve works! x = {:?}", x.as_f64());

    let svd = linalg.gesdd(&a).expect("gesdd failed");
    println!("Singular values: {:?}", svd.singular_values.as_f64());
}
