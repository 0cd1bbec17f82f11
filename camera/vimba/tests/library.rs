use vimba::{Error, VimbaLibrary};

#[test]
fn missing_library_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no-such-libVmbC.so");
    match VimbaLibrary::from_dynamic_lib_path(&missing) {
        Err(Error::LibLoading { vimbac_path, .. }) => assert_eq!(vimbac_path, missing),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("loaded a library that does not exist"),
    }
}

#[test]
fn not_a_library_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("libVmbC.so");
    std::fs::write(&fake, b"this is not a shared object").unwrap();
    let err = VimbaLibrary::from_dynamic_lib_path(&fake)
        .err()
        .expect("loading garbage must fail");
    assert!(err.to_string().contains("Loading library at"));
}
