//! Integration tests for profile discovery against fake home directories

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;
use tracesweep::models::{BrowserKind, EngineFamily};
use tracesweep::services::{PlatformRoots, ProfileDiscovery, TargetOs};

fn fake_home() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().unwrap();
    let home = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    (temp, home)
}

fn discovery(os: TargetOs, home: &Utf8Path) -> ProfileDiscovery {
    ProfileDiscovery::with_roots(os, PlatformRoots::under_home(os, home))
}

fn mkdirs(base: &Utf8Path, names: &[&str]) {
    for name in names {
        fs::create_dir_all(base.join(name)).unwrap();
    }
}

#[test]
fn test_linux_chromium_profiles_in_numeric_order() {
    let (_temp, home) = fake_home();
    let user_data = home.join(".config/google-chrome");
    mkdirs(
        &user_data,
        &["Default", "Profile 10", "Profile 2", "System Profile", "Crashpad"],
    );
    fs::write(user_data.join("Local State"), "{}").unwrap();

    let profiles = discovery(TargetOs::Linux, &home)
        .discover_browser(BrowserKind::Chrome)
        .unwrap();

    let names: Vec<&str> = profiles.iter().map(|p| p.profile_name()).collect();
    assert_eq!(names, vec!["Default", "Profile 2", "Profile 10"]);
    assert!(profiles[0].is_default);
    assert!(!profiles[1].is_default);
    assert!(profiles.iter().all(|p| p.data_dir == user_data));
    assert_eq!(profiles[2].display_name, "Google Chrome (Profile 10)");
}

#[test]
fn test_linux_gecko_profiles_with_ini_default() {
    let (_temp, home) = fake_home();
    let base = home.join(".mozilla/firefox");
    mkdirs(&base, &["k3j4.work", "a1b2.default-release", "zz.empty"]);
    fs::write(base.join("k3j4.work/prefs.js"), "").unwrap();
    fs::write(base.join("a1b2.default-release/cookies.sqlite"), "").unwrap();
    fs::write(
        base.join("profiles.ini"),
        "[Profile0]\nName=work\nIsRelative=1\nPath=k3j4.work\nDefault=1\n",
    )
    .unwrap();

    let profiles = discovery(TargetOs::Linux, &home)
        .discover_browser(BrowserKind::Firefox)
        .unwrap();

    // zz.empty has neither prefs.js nor cookies.sqlite
    assert_eq!(profiles.len(), 2);
    assert!(profiles.iter().all(|p| p.is_default));
    assert!(profiles.iter().all(|p| p.engine() == EngineFamily::Gecko));
}

#[test]
fn test_windows_layout() {
    let (_temp, home) = fake_home();
    mkdirs(
        &home.join("AppData/Local/Microsoft/Edge/User Data"),
        &["Default", "Profile 1"],
    );
    let opera = home.join("AppData/Roaming/Opera Software/Opera Stable");
    mkdirs(&opera, &["Network"]);
    let librewolf = home.join("AppData/Roaming/librewolf/Profiles/x.default");
    fs::create_dir_all(&librewolf).unwrap();
    fs::write(librewolf.join("prefs.js"), "").unwrap();

    let profiles = discovery(TargetOs::Windows, &home).discover();

    let kinds: Vec<BrowserKind> = profiles.iter().map(|p| p.browser).collect();
    assert_eq!(
        kinds,
        vec![
            BrowserKind::Edge,
            BrowserKind::Edge,
            BrowserKind::Opera,
            BrowserKind::LibreWolf
        ]
    );

    let opera_profile = &profiles[2];
    assert_eq!(opera_profile.profile_dir, opera);
    assert_eq!(opera_profile.display_name, "Opera");
    assert!(opera_profile.is_default);
}

#[test]
fn test_macos_safari_and_ini_one_level_up() {
    let (_temp, home) = fake_home();
    mkdirs(&home, &["Library/Safari"]);
    let support = home.join("Library/Application Support/Firefox");
    mkdirs(&support.join("Profiles"), &["q9.personal"]);
    fs::write(support.join("Profiles/q9.personal/prefs.js"), "").unwrap();
    fs::write(
        support.join("profiles.ini"),
        "[Profile0]\nPath=Profiles/q9.personal\nDefault=1\n",
    )
    .unwrap();

    let profiles = discovery(TargetOs::MacOs, &home).discover();

    assert_eq!(profiles.len(), 2);
    let firefox = &profiles[0];
    assert_eq!(firefox.browser, BrowserKind::Firefox);
    assert!(firefox.is_default);

    let safari = &profiles[1];
    assert_eq!(safari.browser, BrowserKind::Safari);
    assert_eq!(safari.engine(), EngineFamily::WebKit);
    assert_eq!(safari.data_dir, home.join("Library"));
}

#[test]
fn test_only_restricts_browsers() {
    let (_temp, home) = fake_home();
    mkdirs(&home.join(".config/google-chrome"), &["Default"]);
    mkdirs(&home.join(".config/chromium"), &["Default"]);

    let profiles = discovery(TargetOs::Linux, &home)
        .only(BrowserKind::Chromium)
        .discover();

    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].browser, BrowserKind::Chromium);
}

#[test]
fn test_discovery_does_not_touch_disk() {
    let (_temp, home) = fake_home();
    let before: Vec<_> = fs::read_dir(&home).unwrap().collect();
    assert!(discovery(TargetOs::Linux, &home).discover().is_empty());
    let after: Vec<_> = fs::read_dir(&home).unwrap().collect();
    assert_eq!(before.len(), after.len());
}
