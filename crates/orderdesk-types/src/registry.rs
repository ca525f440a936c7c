//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage, account) exposes a `Registry` struct per
/// implementation that names the implementation and hands out its factory.
pub trait ImplementationRegistry {
	/// Name used in configuration to select this implementation, for example
	/// `"memory"` for `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// Factory function type of the owning module.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
