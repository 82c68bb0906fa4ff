use splitx_core::fixture::{
    apk_bytes, apk_with_declared_manifest_size, BundleFixture, ManifestFixture,
};
use splitx_core::{
    DeviceProfile, DirectoryApkSource, ExtractorRegistry, NoopPostprocessor, Resolver,
    ZipApkSource,
};
use splitx_schema::{
    Abi, Category, LocaleTag, ModuleName, ResolutionResult, SplitApkSourceMeta, SplitError, SplitKind,
};
use std::io::Cursor;

fn resolve_with(resolver: &Resolver, name: &str, bundle: &BundleFixture) -> ResolutionResult {
    let bytes = bundle.to_bytes().unwrap();
    let source = ZipApkSource::from_reader(name, Cursor::new(bytes)).unwrap();
    resolver.resolve(source).unwrap()
}

fn resolve(name: &str, bundle: &BundleFixture) -> ResolutionResult {
    resolve_with(&Resolver::default(), name, bundle)
}

fn success(result: &ResolutionResult) -> &SplitApkSourceMeta {
    match result {
        ResolutionResult::Success(meta) => meta,
        ResolutionResult::Failure(err) => panic!("expected success, got {err}"),
    }
}

fn failure(result: &ResolutionResult) -> &SplitError {
    let err = result.error().expect("expected failure");
    assert!(err.fatal, "structural failures are fatal");
    &err.error
}

fn categories(meta: &SplitApkSourceMeta) -> Vec<Category> {
    meta.categories.iter().map(|c| c.category).collect()
}

fn base(version_code: i32) -> ManifestFixture {
    ManifestFixture::base("com.example", version_code, "1.2")
}

fn split(name: &str) -> ManifestFixture {
    ManifestFixture::split("com.example", 3, name)
}

// Single base package.
#[test]
fn scenario_a_base_only() {
    let bundle = BundleFixture::new().apk("base.apk", &base(3)).unwrap();
    let result = resolve("app.zip", &bundle);
    let meta = success(&result);

    assert_eq!(categories(meta), [Category::Base]);
    let parts = &meta.categories[0].parts;
    assert_eq!(parts.len(), 1);
    assert!(parts[0].is_base);
    assert_eq!(parts[0].entry_name, "base.apk");

    assert_eq!(meta.app_meta.package_name.as_ref().unwrap(), "com.example");
    assert_eq!(meta.app_meta.version_code, Some(3));
    assert_eq!(meta.app_meta.version_name.as_deref(), Some("1.2"));
    assert!(meta.auxiliary_files.is_empty());
}

// Base plus a locale config split.
#[test]
fn scenario_b_base_and_locale() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk("config.en.apk", &split("config.en"))
        .unwrap();
    let result = resolve("app.zip", &bundle);
    let meta = success(&result);

    assert_eq!(categories(meta), [Category::Base, Category::ConfigLocale]);
    let locale = &meta.categories[1].parts[0];
    assert_eq!(
        locale.meta.kind,
        SplitKind::LocaleConfig {
            locale: LocaleTag::new("en", None),
            module: None,
        }
    );
    assert_eq!(locale.display_name, "en for base");
    assert!(!locale.is_base);
    assert!(!locale.is_required);
}

// Two packages without a split attribute.
#[test]
fn scenario_c_two_bases() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk("other.apk", &base(3))
        .unwrap();
    let result = resolve("app.zip", &bundle);
    assert_eq!(
        *failure(&result),
        SplitError::MultipleBaseApks {
            first: "base.apk".to_owned(),
            second: "other.apk".to_owned(),
        }
    );
}

// Nested package without a manifest.
#[test]
fn scenario_d_missing_manifest() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .entry("config.en.apk", &apk_bytes(None).unwrap());
    let result = resolve("app.zip", &bundle);
    assert_eq!(
        *failure(&result),
        SplitError::NoManifestInPackage {
            entry: "config.en.apk".to_owned()
        }
    );
}

// Zip64 header claiming an absurd manifest size.
#[test]
fn inflated_declared_manifest_size_still_resolves() {
    let manifest = base(3).encode();
    let apk = apk_with_declared_manifest_size(&manifest, u64::MAX).unwrap();
    let bundle = BundleFixture::new()
        .entry("base.apk", &apk)
        .apk("config.en.apk", &split("config.en"))
        .unwrap();
    let result = resolve("app.apks", &bundle);
    let meta = success(&result);
    assert_eq!(categories(meta), [Category::Base, Category::ConfigLocale]);
    assert_eq!(meta.app_meta.version_code, Some(3));
}

#[test]
fn explicit_base_split_name_is_base() {
    let manifest = ManifestFixture::split("com.example", 3, "base").version_name("1.2");
    let bundle = BundleFixture::new().apk("base.apk", &manifest).unwrap();
    let result = resolve("app.zip", &bundle);
    assert!(success(&result).categories[0].parts[0].is_base);
}

#[test]
fn package_mismatch_names_both_packages() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk(
            "config.en.apk",
            &ManifestFixture::split("com.other", 3, "config.en"),
        )
        .unwrap();
    let result = resolve("app.zip", &bundle);
    match failure(&result) {
        SplitError::PackageMismatch {
            entry,
            expected,
            found,
        } => {
            assert_eq!(entry, "config.en.apk");
            assert_eq!(expected, "com.example");
            assert_eq!(found, "com.other");
        }
        other => panic!("unexpected failure {other:?}"),
    }
}

#[test]
fn version_mismatch() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk(
            "config.en.apk",
            &ManifestFixture::split("com.example", 4, "config.en"),
        )
        .unwrap();
    let result = resolve("app.zip", &bundle);
    assert_eq!(
        *failure(&result),
        SplitError::VersionMismatch {
            entry: "config.en.apk".to_owned(),
            expected: 3,
            found: 4,
        }
    );
}

#[test]
fn version_code_major_is_part_of_identity() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3).version_code_major(1))
        .unwrap()
        .apk("config.en.apk", &split("config.en"))
        .unwrap();
    let result = resolve("app.zip", &bundle);
    assert_eq!(
        *failure(&result),
        SplitError::VersionMismatch {
            entry: "config.en.apk".to_owned(),
            expected: (1 << 32) | 3,
            found: 3,
        }
    );
}

#[test]
fn first_enumerated_package_sets_identity() {
    // The split comes first, so the base is the one reported as mismatched.
    let bundle = BundleFixture::new()
        .apk(
            "config.en.apk",
            &ManifestFixture::split("com.split", 3, "config.en"),
        )
        .unwrap()
        .apk("base.apk", &base(3))
        .unwrap();
    let result = resolve("app.zip", &bundle);
    match failure(&result) {
        SplitError::PackageMismatch {
            entry,
            expected,
            found,
        } => {
            assert_eq!(entry, "base.apk");
            assert_eq!(expected, "com.split");
            assert_eq!(found, "com.example");
        }
        other => panic!("unexpected failure {other:?}"),
    }
}

#[test]
fn no_packages_found() {
    let bundle = BundleFixture::new()
        .entry("readme.txt", b"hello")
        .entry("base.apks", b"not an apk by suffix");
    let result = resolve("app.zip", &bundle);
    assert_eq!(*failure(&result), SplitError::NoPackagesFound);

    let empty = BundleFixture::new();
    assert_eq!(
        *failure(&resolve("app.zip", &empty)),
        SplitError::NoPackagesFound
    );
}

#[test]
fn duplicate_manifest_root() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3).duplicate_root())
        .unwrap();
    let result = resolve("app.zip", &bundle);
    assert_eq!(
        *failure(&result),
        SplitError::DuplicateManifestRoot {
            entry: "base.apk".to_owned()
        }
    );
}

#[test]
fn missing_manifest_element() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3).root_name("application"))
        .unwrap();
    let result = resolve("app.zip", &bundle);
    assert!(matches!(
        failure(&result),
        SplitError::NoManifestElement { entry, .. } if entry == "base.apk"
    ));
}

#[test]
fn base_without_version_name_is_invalid() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3).without_version_name())
        .unwrap();
    let result = resolve("app.zip", &bundle);
    match failure(&result) {
        SplitError::NoManifestElement { reason, .. } => assert!(reason.contains("versionName")),
        other => panic!("unexpected failure {other:?}"),
    }
}

#[test]
fn category_order_ignores_entry_order() {
    let bundle = BundleFixture::new()
        .apk("mystery.apk", &split("mystery"))
        .unwrap()
        .apk("config.xxhdpi.apk", &split("config.xxhdpi"))
        .unwrap()
        .apk("config.de.apk", &split("config.de"))
        .unwrap()
        .apk("config.arm64_v8a.apk", &split("config.arm64_v8a"))
        .unwrap()
        .apk("camera.apk", &split("camera").feature())
        .unwrap()
        .apk("base.apk", &base(3))
        .unwrap();
    let result = resolve("app.zip", &bundle);
    let meta = success(&result);
    assert_eq!(categories(meta), Category::ALL);

    let unknown = &meta.categories[5];
    assert_eq!(
        unknown.description.as_deref(),
        Some("These splits could not be classified. They are installed unless deselected.")
    );
    assert!(unknown.parts[0].is_required);
    assert_eq!(unknown.parts[0].display_name, "mystery");
    assert_eq!(meta.categories[1].parts[0].display_name, "module camera");
}

#[test]
fn module_config_splits() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk("camera.apk", &split("camera").feature())
        .unwrap()
        .apk(
            "camera.config.x86_64.apk",
            &split("camera.config.x86_64"),
        )
        .unwrap()
        .apk(
            "split_config.hdpi.apk",
            &split("config.hdpi").config_for("camera"),
        )
        .unwrap();
    let result = resolve("app.zip", &bundle);
    let meta = success(&result);
    let abi = &meta.categories[2].parts[0];
    assert_eq!(abi.meta.kind, SplitKind::AbiConfig {
        abi: Abi::X86_64,
        module: Some(ModuleName::new("camera")),
    });
    assert_eq!(abi.display_name, "x86_64 for module camera");
    let density = &meta.categories[3].parts[0];
    assert_eq!(density.display_name, "hdpi (240 dpi) for module camera");
}

#[test]
fn auxiliary_files_and_sai_metadata() {
    let bundle = BundleFixture::new()
        .entry(
            "meta.sai_v2.json",
            br#"{"label":"Example","package":"com.stale","version_code":1,"version_name":"0.1","min_sdk":23}"#,
        )
        .apk("base.apk", &base(3))
        .unwrap()
        .entry("icon.png", b"\x89PNG\r\n")
        .entry("Android/obb/com.example/main.3.com.example.obb", b"obb");
    let result = resolve("Example.APKS", &bundle);
    let meta = success(&result);

    assert_eq!(
        meta.auxiliary_files,
        [
            "meta.sai_v2.json",
            "icon.png",
            "Android/obb/com.example/main.3.com.example.obb"
        ]
    );
    let app = &meta.app_meta;
    assert_eq!(app.label.as_deref(), Some("Example"));
    assert_eq!(app.min_sdk, Some(23));
    assert_eq!(app.icon.as_ref().unwrap().size, 6);
    // Manifest values win over the bundle's metadata file.
    assert_eq!(app.package_name.as_ref().unwrap(), "com.example");
    assert_eq!(app.version_code, Some(3));
    assert_eq!(app.version_name.as_deref(), Some("1.2"));
}

#[test]
fn xapk_and_apkm_metadata() {
    let xapk = BundleFixture::new()
        .entry("manifest.json", br#"{"package_name":"com.example","name":"X Example","version_code":"3"}"#)
        .apk("com.example.apk", &base(3))
        .unwrap();
    let result = resolve("example.xapk", &xapk);
    assert_eq!(success(&result).app_meta.label.as_deref(), Some("X Example"));

    let apkm = BundleFixture::new()
        .entry("info.json", br#"{"pname":"com.example","app_name":"M Example","min_api":"26"}"#)
        .apk("base.apk", &base(3))
        .unwrap();
    let result = resolve("example.apkm", &apkm);
    let app = &success(&result).app_meta;
    assert_eq!(app.label.as_deref(), Some("M Example"));
    assert_eq!(app.min_sdk, Some(26));
}

#[test]
fn plain_zip_has_no_extractor() {
    let bundle = BundleFixture::new()
        .entry("manifest.json", br#"{"name":"Ignored"}"#)
        .apk("base.apk", &base(3))
        .unwrap();
    let result = resolve("example.zip", &bundle);
    let meta = success(&result);
    assert_eq!(meta.app_meta.label, None);
    assert_eq!(meta.auxiliary_files, ["manifest.json"]);

    let resolver = Resolver::new(ExtractorRegistry::empty(), Box::new(NoopPostprocessor));
    let result = resolve_with(&resolver, "example.xapk", &bundle);
    assert_eq!(success(&result).app_meta.label, None);
}

#[test]
fn device_profile_recommends_matching_splits() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk("config.armeabi_v7a.apk", &split("config.armeabi_v7a"))
        .unwrap()
        .apk("config.arm64_v8a.apk", &split("config.arm64_v8a"))
        .unwrap()
        .apk("config.de.apk", &split("config.de"))
        .unwrap()
        .apk("config.en.apk", &split("config.en"))
        .unwrap()
        .apk("config.mdpi.apk", &split("config.mdpi"))
        .unwrap()
        .apk("config.xhdpi.apk", &split("config.xhdpi"))
        .unwrap();
    let profile = DeviceProfile::new(
        vec![Abi::Arm64V8a, Abi::ArmeabiV7a],
        vec![LocaleTag::new("en", Some("GB"))],
        280,
    );
    let result = resolve_with(&Resolver::for_device(profile), "app.zip", &bundle);
    let meta = success(&result);

    let recommended: Vec<&str> = meta
        .parts()
        .filter(|p| p.is_recommended)
        .map(|p| p.entry_name.as_str())
        .collect();
    assert_eq!(
        recommended,
        [
            "base.apk",
            "config.arm64_v8a.apk",
            "config.en.apk",
            "config.xhdpi.apk"
        ]
    );
}

#[test]
fn directory_source() {
    let dir = tempfile::tempdir().unwrap();
    BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk("splits/config.en.apk", &split("config.en"))
        .unwrap()
        .entry("notes.txt", b"n")
        .unpack_to(dir.path())
        .unwrap();

    let source = DirectoryApkSource::open(dir.path()).unwrap();
    let result = Resolver::default().resolve(source).unwrap();
    let meta = success(&result);
    assert_eq!(categories(meta), [Category::Base, Category::ConfigLocale]);
    assert_eq!(meta.auxiliary_files, ["notes.txt"]);
    let locale = &meta.categories[1].parts[0];
    assert_eq!(locale.entry_name, "splits/config.en.apk");
    assert!(locale.local_path.ends_with("config.en.apk"));
}

#[test]
fn resolve_path_handles_files_and_directories() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("app.apks");
    BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .write_to(&archive)
        .unwrap();
    assert!(Resolver::default().resolve_path(&archive).unwrap().is_success());

    let unpacked = dir.path().join("unpacked");
    std::fs::create_dir(&unpacked).unwrap();
    BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .unpack_to(&unpacked)
        .unwrap();
    assert!(Resolver::default().resolve_path(&unpacked).unwrap().is_success());

    assert!(Resolver::default()
        .resolve_path(&dir.path().join("missing.zip"))
        .is_err());
}

#[test]
fn resolution_is_repeatable() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .apk("config.en.apk", &split("config.en"))
        .unwrap();
    let resolver = Resolver::default();
    assert_eq!(
        resolve_with(&resolver, "app.zip", &bundle),
        resolve_with(&resolver, "app.zip", &bundle)
    );
}

#[test]
fn concurrent_resolutions_share_a_resolver() {
    let bundle = BundleFixture::new()
        .apk("base.apk", &base(3))
        .unwrap()
        .to_bytes()
        .unwrap();
    let resolver = Resolver::default();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let source = ZipApkSource::from_reader("app.zip", Cursor::new(bundle.clone())).unwrap();
                assert!(resolver.resolve(source).unwrap().is_success());
            });
        }
    });
}
