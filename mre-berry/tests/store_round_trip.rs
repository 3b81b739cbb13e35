use mre_berry::prelude::*;
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn labels(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn store_save_then_open_is_identical() {
    let grid = GridSpec {
        nx: 8,
        ny: 6,
        nz_mri: 5,
        nz_mre: 2,
    };
    let coords = Coords::new(
        labels(&["0006", "0384"]),
        labels(&["t1_pre_water", "t1_pre_in"]),
        labels(&["liver", "mre"]),
        labels(&["mre", "mre_mask", "mre_raw"]),
        &grid,
    );
    let mut store = VolumeStore::zeros(coords.clone());
    let mut rng = StdRng::seed_from_u64(7);

    let mri = Array3::from_shape_fn((8, 6, 5), |_| rng.gen_range(-2000..2000i16));
    store
        .set_volume(Tensor::ImageMri, "0384", "t1_pre_in", mri.view())
        .unwrap();
    let mre = Array3::from_shape_fn((8, 6, 2), |_| rng.gen_range(0..9000i16));
    store
        .set_volume(Tensor::ImageMre, "0006", "mre_raw", mre.view())
        .unwrap();
    let mask = Array3::from_shape_fn((8, 6, 2), |_| rng.gen_range(0..2i16));
    store
        .set_volume(Tensor::MaskMre, "0006", "mre", mask.view())
        .unwrap();
    store
        .set_slice(
            Tensor::MaskMri,
            "0006",
            "mre",
            4,
            Array2::<i16>::ones((8, 6)).view(),
        )
        .unwrap();
    store.mark_slices("0006", &[1, 4]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xarray_test.npz");
    store.save(&path).unwrap();

    let back = open_store(&path).unwrap();
    assert_eq!(back.coords(), &coords);
    assert_eq!(back, store);
    assert_eq!(back.marked_slices("0006").unwrap(), vec![1, 4]);
    assert!(back.marked_slices("0384").unwrap().is_empty());
    assert_eq!(
        back.volume(Tensor::ImageMri, "0384", "t1_pre_in").unwrap(),
        mri.view()
    );
}

#[test]
fn opening_missing_store_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        open_store(dir.path().join("nope.npz")),
        Err(MreError::Io(_))
    ));
}
