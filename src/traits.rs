/// Types that determine the extension used in derived store keys.
pub trait AsExtension {
    fn as_extension(&self) -> String;
}
