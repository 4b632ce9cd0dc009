use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn bin() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pwcrypt"))
}

#[test]
fn set_and_get_roundtrip() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("set")
        .arg("mail")
        .arg("hunter2")
        .assert()
        .success()
        .stdout(predicate::str::contains("stored password"));

    bin()
        .arg("--store")
        .arg(&store)
        .arg("get")
        .arg("mail")
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2"));
}

#[test]
fn stored_record_is_obfuscated_on_disk() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("set")
        .arg("mail")
        .arg("hunter2")
        .assert()
        .success();

    let raw = std::fs::read_to_string(&store).unwrap();
    assert!(raw.contains("CE4"));
    assert!(!raw.contains("hunter2"));
}

#[test]
fn list_shows_stored_names() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    for (name, pw) in [("mail", "a"), ("irc", "b")] {
        bin()
            .arg("--store")
            .arg(&store)
            .arg("set")
            .arg(name)
            .arg(pw)
            .assert()
            .success();
    }

    bin()
        .arg("--store")
        .arg(&store)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("mail").and(predicate::str::contains("irc")));
}

#[test]
fn remove_deletes_the_record() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("set")
        .arg("mail")
        .arg("hunter2")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .arg("remove")
        .arg("mail")
        .assert()
        .success()
        .stdout(predicate::str::contains("removed"));

    bin()
        .arg("--store")
        .arg(&store)
        .arg("get")
        .arg("mail")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no password stored"));
}

#[test]
fn remove_of_unknown_name_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("remove")
        .arg("nothing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no password stored"));
}

#[test]
fn enabling_main_password_recodes_the_store() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("set")
        .arg("mail")
        .arg("hunter2")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .arg("use-main-password")
        .arg("on")
        .write_stdin("mainpw\nmainpw\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("main password enabled"));

    let raw = std::fs::read_to_string(&store).unwrap();
    assert!(raw.contains("CR5"));
    assert!(!raw.contains("CE4"));

    bin()
        .arg("--store")
        .arg(&store)
        .env("PWCRYPT_MAIN_PASSWORD", "mainpw")
        .arg("get")
        .arg("mail")
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2"));
}

#[test]
fn get_with_wrong_main_password_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("set")
        .arg("mail")
        .arg("hunter2")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .arg("use-main-password")
        .arg("on")
        .write_stdin("mainpw\nmainpw\n")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .env("PWCRYPT_MAIN_PASSWORD", "wrong")
        .arg("get")
        .arg("mail")
        .assert()
        .failure()
        .stderr(predicate::str::contains("wrong main password"));
}

#[test]
fn changing_main_password_reencrypts() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("set")
        .arg("mail")
        .arg("hunter2")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .arg("use-main-password")
        .arg("on")
        .write_stdin("oldpw\noldpw\n")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .env("PWCRYPT_MAIN_PASSWORD", "oldpw")
        .arg("change-main-password")
        .write_stdin("newpw\nnewpw\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("main password changed"));

    bin()
        .arg("--store")
        .arg(&store)
        .env("PWCRYPT_MAIN_PASSWORD", "newpw")
        .arg("get")
        .arg("mail")
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2"));

    bin()
        .arg("--store")
        .arg(&store)
        .env("PWCRYPT_MAIN_PASSWORD", "oldpw")
        .arg("get")
        .arg("mail")
        .assert()
        .failure();
}

#[test]
fn disabling_main_password_restores_plain_encoding() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("passwords.json");

    bin()
        .arg("--store")
        .arg(&store)
        .arg("set")
        .arg("mail")
        .arg("hunter2")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .arg("use-main-password")
        .arg("on")
        .write_stdin("mainpw\nmainpw\n")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .env("PWCRYPT_MAIN_PASSWORD", "mainpw")
        .arg("use-main-password")
        .arg("off")
        .assert()
        .success()
        .stdout(predicate::str::contains("main password disabled"));

    // no main password needed anymore
    bin()
        .arg("--store")
        .arg(&store)
        .arg("get")
        .arg("mail")
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2"));
}

#[test]
fn encrypt_and_decrypt_file_roundtrip() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("enc.bin");
    let out = dir.path().join("out.txt");
    std::fs::write(&plain, b"file payload").unwrap();

    bin()
        .env("PWCRYPT_MAIN_PASSWORD", "filepw")
        .arg("encrypt-file")
        .arg(&plain)
        .arg(&enc)
        .assert()
        .success();

    let edata = std::fs::read(&enc).unwrap();
    assert!(edata.starts_with(b"CR5"));

    bin()
        .env("PWCRYPT_MAIN_PASSWORD", "filepw")
        .arg("decrypt-file")
        .arg(&enc)
        .arg(&out)
        .assert()
        .success();

    assert_eq!(std::fs::read(&out).unwrap(), b"file payload");
}

#[test]
fn decrypt_file_with_wrong_password_fails() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("enc.bin");
    std::fs::write(&plain, b"file payload").unwrap();

    bin()
        .env("PWCRYPT_MAIN_PASSWORD", "filepw")
        .arg("encrypt-file")
        .arg(&plain)
        .arg(&enc)
        .assert()
        .success();

    bin()
        .env("PWCRYPT_MAIN_PASSWORD", "other")
        .arg("decrypt-file")
        .arg(&enc)
        .arg(dir.path().join("out.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("decryption failed"));
}
