// Foreground-window context and dictation preset resolution
//
// The controller captures the target window at recording start and, for
// dictation, asks the resolver for the effective preset. Both come from
// collaborators; once resolved, the preset is locked for the session.

/// Foreground application/window captured at recording start
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetWindow {
    /// Name of the foreground application
    pub app_name: String,
    /// Bundle ID of the application (macOS)
    pub bundle_id: Option<String>,
    /// Title of the active window
    pub window_title: Option<String>,
}

/// Dictation preset resolved for the current window context
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPreset {
    pub id: String,
    /// System prompt override sent to the provider, if the preset has one
    pub system_prompt: Option<String>,
}

/// Source of foreground-window context and the user's current selection
pub trait WindowContextSource: Send + Sync {
    fn foreground_window(&self) -> Option<TargetWindow>;

    /// Currently selected text in the foreground app, used as context for
    /// ask mode.
    fn selected_text(&self) -> Option<String>;
}

/// Resolves the effective dictation preset for a window context.
///
/// Returning `None` means no preset applies and the provider default prompt
/// is used.
pub trait DictationContextResolver: Send + Sync {
    fn resolve(&self, window: Option<&TargetWindow>) -> Option<ResolvedPreset>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(Option<ResolvedPreset>);

    impl DictationContextResolver for FixedResolver {
        fn resolve(&self, _window: Option<&TargetWindow>) -> Option<ResolvedPreset> {
            self.0.clone()
        }
    }

    #[test]
    fn test_resolver_contract() {
        let preset = ResolvedPreset {
            id: "email".to_string(),
            system_prompt: Some("Formal tone.".to_string()),
        };
        let resolver = FixedResolver(Some(preset.clone()));
        assert_eq!(resolver.resolve(None), Some(preset));

        let resolver = FixedResolver(None);
        assert_eq!(resolver.resolve(None), None);
    }

    #[test]
    fn test_target_window_serializes_camel_case() {
        let window = TargetWindow {
            app_name: "Notes".to_string(),
            bundle_id: Some("com.apple.Notes".to_string()),
            window_title: None,
        };
        let json = serde_json::to_string(&window).unwrap();
        assert!(json.contains("appName"));
        assert!(json.contains("bundleId"));
    }
}
