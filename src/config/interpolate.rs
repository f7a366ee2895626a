//! Configuration value interpolation
//!
//! Path-valued settings and toolchain locations accept `~` and environment
//! variables (`$VAR`, `${VAR}`, `${VAR:-default}`). Command templates are
//! left alone: the shell that runs them expands variables itself.

/// Expand `~` and environment variables in one value
///
/// Unset variables leave the value untouched so the problem stays visible.
///
/// # Examples
///
/// ```
/// use kiln::config::interpolate::interpolate_string;
///
/// std::env::set_var("KILN_DOC_VAR", "hello");
/// assert_eq!(interpolate_string("Value: $KILN_DOC_VAR"), "Value: hello");
/// std::env::remove_var("KILN_DOC_VAR");
/// ```
pub fn interpolate_string(s: &str) -> String {
    match shellexpand::full(s) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            tracing::warn!("Failed to expand config value '{}': {}", s, e);
            s.to_string()
        }
    }
}

fn interpolate_option(value: &mut Option<String>) {
    if let Some(ref mut v) = value {
        *v = interpolate_string(v);
    }
}

/// Interpolate the path-like values of a Config
pub fn interpolate_config(config: &mut super::model::Config) {
    config.target.build_dir = interpolate_string(&config.target.build_dir);
    interpolate_option(&mut config.link.output);
    interpolate_option(&mut config.build.shell);
    interpolate_option(&mut config.build.toolchain_dir);

    for toolchain in config.toolchains.values_mut() {
        interpolate_option(&mut toolchain.repository);
        interpolate_option(&mut toolchain.url);
    }
}
