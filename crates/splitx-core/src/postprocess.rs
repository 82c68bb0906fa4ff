//! Recommendation pass run once over the category index of a resolution.

use crate::device::DeviceProfile;
use splitx_schema::{Abi, Category, ModuleName, ScreenDensity, SplitCategoryIndex, SplitKind, SplitPart};
use std::collections::BTreeMap;
use tracing::debug;

pub trait SplitPostprocessor: Send + Sync {
    fn process(&self, index: &mut SplitCategoryIndex);
}

/// Leaves every part as classified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPostprocessor;

impl SplitPostprocessor for NoopPostprocessor {
    fn process(&self, _index: &mut SplitCategoryIndex) {}
}

/// Marks the config splits a given device needs as recommended.
///
/// Selection is made per owning module, so a feature module gets its own ABI
/// and density picks independent of the base.
#[derive(Debug, Clone)]
pub struct DeviceInfoAwarePostprocessor {
    profile: DeviceProfile,
}

impl DeviceInfoAwarePostprocessor {
    pub fn new(profile: DeviceProfile) -> Self {
        Self { profile }
    }

    fn mark_abis(&self, parts: &mut [SplitPart]) {
        let mut available: BTreeMap<Option<ModuleName>, Vec<Abi>> = BTreeMap::new();
        for part in parts.iter() {
            if let SplitKind::AbiConfig { abi, module } = &part.meta.kind {
                available.entry(module.clone()).or_default().push(*abi);
            }
        }
        let chosen: BTreeMap<Option<ModuleName>, Abi> = available
            .into_iter()
            .filter_map(|(module, abis)| {
                let abi = self.profile.abis.iter().find(|a| abis.contains(a))?;
                Some((module, *abi))
            })
            .collect();

        for part in parts {
            if let SplitKind::AbiConfig { abi, module } = &part.meta.kind {
                let matched = chosen.get(module) == Some(abi);
                recommend(part, matched);
            }
        }
    }

    fn mark_locales(&self, parts: &mut [SplitPart]) {
        for part in parts {
            if let SplitKind::LocaleConfig { locale, .. } = &part.meta.kind {
                let matched = self
                    .profile
                    .locales
                    .iter()
                    .any(|l| l.language == locale.language);
                recommend(part, matched);
            }
        }
    }

    fn mark_densities(&self, parts: &mut [SplitPart]) {
        let mut available: BTreeMap<Option<ModuleName>, Vec<ScreenDensity>> = BTreeMap::new();
        for part in parts.iter() {
            if let SplitKind::DensityConfig { density, module } = &part.meta.kind {
                if density.is_concrete() {
                    available.entry(module.clone()).or_default().push(*density);
                }
            }
        }
        let chosen: BTreeMap<Option<ModuleName>, ScreenDensity> = available
            .into_iter()
            .filter_map(|(module, densities)| {
                Some((module, best_density(&densities, self.profile.density_dpi)?))
            })
            .collect();

        for part in parts {
            if let SplitKind::DensityConfig { density, module } = &part.meta.kind {
                let matched = chosen.get(module) == Some(density);
                recommend(part, matched);
            }
        }
    }
}

/// Smallest density at or above the device's, else the largest below it.
fn best_density(available: &[ScreenDensity], device_dpi: u32) -> Option<ScreenDensity> {
    let at_or_above = available
        .iter()
        .filter(|d| d.dpi() >= device_dpi)
        .min_by_key(|d| d.dpi());
    at_or_above
        .or_else(|| available.iter().max_by_key(|d| d.dpi()))
        .copied()
}

fn recommend(part: &mut SplitPart, matched: bool) {
    part.is_recommended = part.is_required || matched;
    if matched {
        debug!("recommending {}", part.display_name);
    }
}

impl SplitPostprocessor for DeviceInfoAwarePostprocessor {
    fn process(&self, index: &mut SplitCategoryIndex) {
        if let Some(category) = index.get_mut(Category::ConfigAbi) {
            self.mark_abis(&mut category.parts);
        }
        if let Some(category) = index.get_mut(Category::ConfigLocale) {
            self.mark_locales(&mut category.parts);
        }
        if let Some(category) = index.get_mut(Category::ConfigDensity) {
            self.mark_densities(&mut category.parts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitx_schema::{LocaleTag, PackageName, SplitMeta};

    fn part(kind: SplitKind) -> SplitPart {
        let meta = SplitMeta {
            package_name: PackageName::new("com.example"),
            version_code: 1,
            split_name: String::new(),
            kind,
        };
        let name = meta.display_name();
        SplitPart::new(meta, "x.apk", "x.apk", name, None, false, false)
    }

    fn recommended(index: &SplitCategoryIndex, category: Category) -> Vec<String> {
        index
            .get(category)
            .map(|c| {
                c.parts
                    .iter()
                    .filter(|p| p.is_recommended)
                    .map(|p| p.display_name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn phone() -> DeviceInfoAwarePostprocessor {
        DeviceInfoAwarePostprocessor::new(DeviceProfile::new(
            vec![Abi::Arm64V8a, Abi::ArmeabiV7a],
            vec![LocaleTag::new("de", Some("AT"))],
            400,
        ))
    }

    #[test]
    fn picks_first_supported_abi_per_module() {
        let mut index = SplitCategoryIndex::new();
        let cat = index.category(Category::ConfigAbi);
        cat.add_part(part(SplitKind::AbiConfig { abi: Abi::X86, module: None }));
        cat.add_part(part(SplitKind::AbiConfig { abi: Abi::ArmeabiV7a, module: None }));
        cat.add_part(part(SplitKind::AbiConfig { abi: Abi::Arm64V8a, module: None }));
        cat.add_part(part(SplitKind::AbiConfig {
            abi: Abi::ArmeabiV7a,
            module: Some(ModuleName::new("camera")),
        }));

        phone().process(&mut index);
        assert_eq!(
            recommended(&index, Category::ConfigAbi),
            ["arm64-v8a for base", "armeabi-v7a for module camera"]
        );
    }

    #[test]
    fn matches_locale_language() {
        let mut index = SplitCategoryIndex::new();
        let cat = index.category(Category::ConfigLocale);
        cat.add_part(part(SplitKind::LocaleConfig { locale: LocaleTag::new("de", None), module: None }));
        cat.add_part(part(SplitKind::LocaleConfig { locale: LocaleTag::new("fr", None), module: None }));

        phone().process(&mut index);
        assert_eq!(recommended(&index, Category::ConfigLocale), ["de for base"]);
    }

    #[test]
    fn density_prefers_next_bucket_up() {
        let mut index = SplitCategoryIndex::new();
        let cat = index.category(Category::ConfigDensity);
        for density in [ScreenDensity::Hdpi, ScreenDensity::Xhdpi, ScreenDensity::Xxhdpi, ScreenDensity::Xxxhdpi] {
            cat.add_part(part(SplitKind::DensityConfig { density, module: None }));
        }

        phone().process(&mut index);
        assert_eq!(recommended(&index, Category::ConfigDensity), ["xxhdpi (480 dpi) for base"]);
    }

    #[test]
    fn density_falls_back_to_largest_below() {
        let available = [ScreenDensity::Mdpi, ScreenDensity::Hdpi, ScreenDensity::Nodpi];
        assert_eq!(best_density(&available, 640), Some(ScreenDensity::Hdpi));
        assert_eq!(best_density(&[], 640), None);
    }

    #[test]
    fn noop_leaves_flags() {
        let mut index = SplitCategoryIndex::new();
        index
            .category(Category::ConfigAbi)
            .add_part(part(SplitKind::AbiConfig { abi: Abi::Arm64V8a, module: None }));
        NoopPostprocessor.process(&mut index);
        assert!(recommended(&index, Category::ConfigAbi).is_empty());
    }
}
