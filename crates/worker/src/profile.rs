//! Isolation profiles: the process fingerprint a worker is selected and reused by.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::spec::{ForkOptions, Param, TypeRef};

/// Package name recorded for types that declare no module path.
pub const DEFAULT_PACKAGE: &str = "DEFAULT";

/// Crates whose types are visible to every worker without classpath entries.
const BOOTSTRAP_CRATES: &[&str] = &["std", "core", "alloc"];

/// Where a type's code lives and which package it belongs to.
pub trait TypeIntrospector: Send + Sync {
	/// Locations backing the loader of `ty`, or `None` for bootstrap types.
	fn locations_for(&self, ty: &TypeRef) -> Option<Vec<PathBuf>>;

	/// Package of `ty`, or `None` for the default package.
	fn package_of(&self, ty: &TypeRef) -> Option<String>;
}

/// Introspector deriving packages from Rust module paths.
///
/// The root segment of a type path names its crate. Crates in the standard
/// library are bootstrap; every other crate resolves to the artifact
/// locations registered for it, or to no locations when unregistered.
#[derive(Debug, Clone, Default)]
pub struct ModulePathIntrospector {
	crate_locations: HashMap<String, Vec<PathBuf>>,
}

impl ModulePathIntrospector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the artifact locations backing `crate_name`.
	#[must_use]
	pub fn with_crate_locations<I, P>(mut self, crate_name: impl Into<String>, locations: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<PathBuf>,
	{
		self.crate_locations
			.entry(crate_name.into())
			.or_default()
			.extend(locations.into_iter().map(Into::into));
		self
	}

	/// Type path with reference, pointer and slice sigils removed.
	fn path_of(ty: &TypeRef) -> &'static str {
		let base = ty.base_path().trim_start_matches(['&', '*', '[', '(']);
		base.strip_prefix("mut ").or_else(|| base.strip_prefix("const ")).unwrap_or(base)
	}

	fn crate_of(ty: &TypeRef) -> Option<&'static str> {
		Self::path_of(ty).split_once("::").map(|(krate, _)| krate)
	}
}

impl TypeIntrospector for ModulePathIntrospector {
	fn locations_for(&self, ty: &TypeRef) -> Option<Vec<PathBuf>> {
		let krate = Self::crate_of(ty)?;
		if BOOTSTRAP_CRATES.contains(&krate) {
			return None;
		}
		Some(self.crate_locations.get(krate).cloned().unwrap_or_default())
	}

	fn package_of(&self, ty: &TypeRef) -> Option<String> {
		Self::path_of(ty).rsplit_once("::").map(|(module, _)| module.to_string())
	}
}

/// Immutable process configuration for one worker.
///
/// Two profiles are compatible exactly when they are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForkProfile {
	min_heap_size: Option<String>,
	max_heap_size: Option<String>,
	process_args: Vec<String>,
	working_dir: PathBuf,
	classpath: BTreeSet<PathBuf>,
	shared_packages: BTreeSet<String>,
}

impl ForkProfile {
	pub fn min_heap_size(&self) -> Option<&str> {
		self.min_heap_size.as_deref()
	}

	pub fn max_heap_size(&self) -> Option<&str> {
		self.max_heap_size.as_deref()
	}

	pub fn process_args(&self) -> &[String] {
		&self.process_args
	}

	pub fn working_dir(&self) -> &Path {
		&self.working_dir
	}

	pub fn classpath(&self) -> &BTreeSet<PathBuf> {
		&self.classpath
	}

	pub fn shared_packages(&self) -> &BTreeSet<String> {
		&self.shared_packages
	}

	/// Short human-readable summary for logs and registry snapshots.
	pub fn summary(&self) -> String {
		format!(
			"heap={}..{} args={} classpath={} packages={}",
			self.min_heap_size.as_deref().unwrap_or("-"),
			self.max_heap_size.as_deref().unwrap_or("-"),
			self.process_args.len(),
			self.classpath.len(),
			self.shared_packages.len()
		)
	}
}

/// Computes the minimal isolation profile for an action and its parameters.
#[derive(Clone)]
pub struct IsolationProfileBuilder {
	introspector: Arc<dyn TypeIntrospector>,
}

impl IsolationProfileBuilder {
	pub fn new(introspector: Arc<dyn TypeIntrospector>) -> Self {
		Self { introspector }
	}

	/// Builds the profile for `action` run with `params` under `base`.
	///
	/// `explicit_classpath` seeds the classpath before derived entries.
	pub fn build(&self, action: &TypeRef, params: &[Param], base: &ForkOptions, explicit_classpath: &[PathBuf]) -> ForkProfile {
		let mut classpath: BTreeSet<PathBuf> = explicit_classpath.iter().cloned().collect();
		let mut shared_packages = BTreeSet::new();

		let mut seen = BTreeSet::new();
		for ty in std::iter::once(action).chain(params.iter().map(Param::type_ref)) {
			if seen.insert(ty) {
				self.add_visibility_for(ty, &mut classpath, &mut shared_packages);
			}
		}

		ForkProfile {
			min_heap_size: base.min_heap_size.clone(),
			max_heap_size: base.max_heap_size.clone(),
			process_args: base.process_args.clone(),
			working_dir: base.working_dir.clone(),
			classpath,
			shared_packages,
		}
	}

	fn add_visibility_for(&self, ty: &TypeRef, classpath: &mut BTreeSet<PathBuf>, packages: &mut BTreeSet<String>) {
		if let Some(locations) = self.introspector.locations_for(ty) {
			classpath.extend(locations);
		}
		let package = self.introspector.package_of(ty).filter(|p| !p.is_empty());
		packages.insert(package.unwrap_or_else(|| DEFAULT_PACKAGE.to_string()));
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use proptest::prelude::*;

	use super::*;

	mod plugin {
		pub mod tasks {
			pub struct Compile;
			pub struct Source(pub String);
			pub struct Target(pub String);
		}
	}

	fn this_crate() -> &'static str {
		TypeRef::of::<plugin::tasks::Compile>().name().split("::").next().unwrap_or_default()
	}

	fn builder() -> IsolationProfileBuilder {
		let introspector = ModulePathIntrospector::new().with_crate_locations(this_crate(), ["/build/libs/plugin.rlib"]);
		IsolationProfileBuilder::new(Arc::new(introspector))
	}

	#[test]
	fn params_sharing_package_and_location_dedupe() {
		let params = [
			Param::new(plugin::tasks::Source("a".into())),
			Param::new(plugin::tasks::Target("b".into())),
		];
		let profile = builder().build(&TypeRef::of::<plugin::tasks::Source>(), &params, &ForkOptions::default(), &[]);

		assert_eq!(profile.classpath().len(), 1);
		assert_eq!(profile.shared_packages().len(), 1);
		assert!(profile.shared_packages().iter().all(|p| p.ends_with("plugin::tasks")));
	}

	#[test]
	fn bootstrap_types_contribute_package_only() {
		let params = [Param::new(String::from("x"))];
		let profile = builder().build(&TypeRef::of::<plugin::tasks::Compile>(), &params, &ForkOptions::default(), &[]);

		assert_eq!(profile.classpath().len(), 1);
		assert!(profile.shared_packages().contains("alloc::string"));
	}

	#[test]
	fn primitives_use_default_package() {
		let params = [Param::new(5u64)];
		let profile = builder().build(&TypeRef::of::<plugin::tasks::Compile>(), &params, &ForkOptions::default(), &[]);
		assert!(profile.shared_packages().contains(DEFAULT_PACKAGE));
	}

	#[test]
	fn explicit_classpath_merges_with_derived() {
		let base = ForkOptions::default().max_heap_size("512m").arg("-Xss4m").working_dir("/work");
		let explicit = [PathBuf::from("/extra/tools.rlib"), PathBuf::from("/build/libs/plugin.rlib")];
		let profile = builder().build(&TypeRef::of::<plugin::tasks::Compile>(), &[], &base, &explicit);

		assert_eq!(
			profile.classpath().iter().cloned().collect::<Vec<_>>(),
			vec![PathBuf::from("/build/libs/plugin.rlib"), PathBuf::from("/extra/tools.rlib")]
		);
		assert_eq!(profile.max_heap_size(), Some("512m"));
		assert_eq!(profile.process_args(), ["-Xss4m".to_string()]);
		assert_eq!(profile.working_dir(), Path::new("/work"));
	}

	#[test]
	fn unregistered_crate_adds_no_locations() {
		let profile = IsolationProfileBuilder::new(Arc::new(ModulePathIntrospector::new())).build(
			&TypeRef::of::<plugin::tasks::Compile>(),
			&[],
			&ForkOptions::default(),
			&[],
		);
		assert!(profile.classpath().is_empty());
		assert_eq!(profile.shared_packages().len(), 1);
	}

	proptest! {
		#[test]
		fn identical_inputs_build_equal_profiles(
			args in prop::collection::vec("[a-z-]{1,8}", 0..5),
			heap in prop::option::of("[0-9]{1,4}m"),
			extra in prop::collection::vec("/[a-z]{1,6}", 0..4),
		) {
			let mut base = ForkOptions::default();
			base.process_args = args;
			base.max_heap_size = heap;
			let explicit: Vec<PathBuf> = extra.into_iter().map(PathBuf::from).collect();
			let params = [Param::new(plugin::tasks::Source("s".into())), Param::new(1u8)];
			let action = TypeRef::of::<plugin::tasks::Compile>();

			let a = builder().build(&action, &params, &base, &explicit);
			let b = builder().build(&action, &params, &base, &explicit);
			prop_assert_eq!(a, b);
		}
	}
}
