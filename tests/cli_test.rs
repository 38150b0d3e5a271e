use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::process::Command; // Run programs

/// A small handwritten image: two 128-byte sectors on cylinder 0 head 0,
/// the second stored compressed.
fn sample_imd() -> Vec<u8> {
    let mut image = b"test disk\r\n".to_vec();
    image.push(0x1A);
    image.extend_from_slice(&[5, 0, 0, 2, 0]); // MFM-250k, 2 sectors, 128 bytes
    image.extend_from_slice(&[1, 2]); // sector map
    image.push(0x01); // plain data
    image.extend_from_slice(&[0x41u8; 128]);
    image.push(0x02); // compressed data
    image.push(0x42);
    image
}

#[test]
fn imdcat_requires_an_image_argument() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("imdcat")?;
    cmd.assert().failure().code(1);
    Ok(())
}

#[test]
fn imdcat_rejects_a_missing_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("imdcat")?;
    cmd.arg("/no/such/image.imd")
        .assert()
        .failure()
        .code(1);
    Ok(())
}

#[test]
fn imdcat_prints_the_comment() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("sample.imd");
    std::fs::write(&image,sample_imd())?;
    let mut cmd = Command::cargo_bin("imdcat")?;
    cmd.arg("-n").arg(&image)
        .assert()
        .success()
        .stdout(predicate::eq(b"test disk\r\n" as &[u8]));
    Ok(())
}

#[test]
fn imdcat_describes_the_image_by_default() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("sample.imd");
    std::fs::write(&image,sample_imd())?;
    let mut cmd = Command::cargo_bin("imdcat")?;
    cmd.arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("MFM-250k 2x128"))
        .stdout(predicate::str::contains("1+"))
        .stdout(predicate::str::contains("2+"));
    Ok(())
}

#[test]
fn imdcat_hexdump_shows_sector_data() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("sample.imd");
    std::fs::write(&image,sample_imd())?;
    let mut cmd = Command::cargo_bin("imdcat")?;
    cmd.arg("-x").arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("Physical C 0 H 0 S 0, logical C 0 H 0 S 1"))
        .stdout(predicate::str::contains("AAAAAAAAAAAAAAAA"));
    Ok(())
}

#[test]
fn imdcat_flattens_to_a_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("sample.imd");
    let flat = dir.path().join("flat.bin");
    std::fs::write(&image,sample_imd())?;
    let mut cmd = Command::cargo_bin("imdcat")?;
    cmd.arg("-o").arg(&flat).arg(&image)
        .assert()
        .success();
    let mut expected = vec![0x41u8; 128];
    expected.extend_from_slice(&[0x42u8; 128]);
    assert_eq!(std::fs::read(&flat)?,expected);
    Ok(())
}

#[test]
fn imdcat_rejects_a_malformed_range() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("sample.imd");
    std::fs::write(&image,sample_imd())?;
    let mut cmd = Command::cargo_bin("imdcat")?;
    cmd.arg("-c").arg("zap").arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("bad range"));
    Ok(())
}

#[test]
fn dumpfloppy_refuses_existing_image_without_retry() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("already.imd");
    std::fs::write(&image,b"anything")?;
    let mut cmd = Command::cargo_bin("dumpfloppy")?;
    cmd.arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn dumpfloppy_refuses_retry_without_prior_image() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("fresh.imd");
    let mut cmd = Command::cargo_bin("dumpfloppy")?;
    cmd.arg("-r").arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
    Ok(())
}
