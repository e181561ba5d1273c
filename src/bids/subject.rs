use std::path::{Path, PathBuf};

/// Identity of one processing run: a BIDS subject and an optional session.
///
/// Immutable once constructed. All raw-input and derivative paths of a run
/// are derived from this value, so every output filename is a pure function
/// of `(subject, session, artifact kind)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRef {
    subject: String,
    session: Option<String>,
}

impl SubjectRef {
    /// Build from BIDS-formatted labels, e.g. `sub-01` and `ses-01`.
    ///
    /// A subject id with an embedded session suffix (`sub-01_ses-01`) is
    /// normalized back to the bare subject part.
    pub fn new(subject: impl Into<String>, session: Option<String>) -> Self {
        let subject = subject.into();
        let subject = match subject.split_once('_') {
            Some((head, _)) => head.to_string(),
            None => subject,
        };
        SubjectRef { subject, session }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Bare label without the `sub-` entity key, as dataset queries want it.
    pub fn subject_label(&self) -> &str {
        self.subject.split_once('-').map_or(&self.subject[..], |(_, l)| l)
    }

    /// Bare label without the `ses-` entity key.
    pub fn session_label(&self) -> Option<&str> {
        self.session
            .as_deref()
            .map(|s| s.split_once('-').map_or(s, |(_, l)| l))
    }

    /// Filename prefix for derivatives: `sub-01` or `sub-01_ses-01`.
    pub fn prefix(&self) -> String {
        match &self.session {
            Some(ses) => format!("{}_{}", self.subject, ses),
            None => self.subject.clone(),
        }
    }

    /// `<base>/<subject>[/<session>]`
    pub fn subject_dir(&self, base: &Path) -> PathBuf {
        let mut dir = base.join(&self.subject);
        if let Some(ses) = &self.session {
            dir.push(ses);
        }
        dir
    }

    /// Conventional location of the raw T1w image.
    pub fn raw_t1w(&self, base: &Path) -> PathBuf {
        self.subject_dir(base)
            .join("anat")
            .join(format!("{}_T1w.nii.gz", self.subject))
    }

    /// Conventional location of the raw T1w JSON sidecar.
    pub fn raw_t1w_sidecar(&self, base: &Path) -> PathBuf {
        self.subject_dir(base)
            .join("anat")
            .join(format!("{}_T1w.json", self.subject))
    }

    /// `<output_root>/cmp/<subject>[/<session>]`, the derivative tree of the run.
    pub fn deriv_dir(&self, output_root: &Path) -> PathBuf {
        self.subject_dir(&output_root.join("cmp"))
    }

    /// `<output_root>/cmp/<subject>[/<session>]/anat`
    pub fn deriv_anat_dir(&self, output_root: &Path) -> PathBuf {
        self.deriv_dir(output_root).join("anat")
    }

    /// `<output_root>/nipype/<subject>[/<session>]`, the engine working tree.
    pub fn work_dir(&self, output_root: &Path) -> PathBuf {
        self.subject_dir(&output_root.join("nipype"))
    }

    /// Derivative filename: `<prefix>_<suffix>`, e.g.
    /// `sub-01_ses-01_desc-cmp_T1w.nii.gz`.
    pub fn derivative_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix(), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_without_session() {
        let s = SubjectRef::new("sub-01", None);
        assert_eq!(s.prefix(), "sub-01");
        assert_eq!(s.subject_label(), "01");
        assert_eq!(s.session_label(), None);
    }

    #[test]
    fn test_prefix_with_session() {
        let s = SubjectRef::new("sub-01", Some("ses-02".to_string()));
        assert_eq!(s.prefix(), "sub-01_ses-02");
        assert_eq!(s.session_label(), Some("02"));
    }

    #[test]
    fn test_embedded_session_is_stripped() {
        let s = SubjectRef::new("sub-01_ses-02", Some("ses-02".to_string()));
        assert_eq!(s.subject(), "sub-01");
        assert_eq!(s.prefix(), "sub-01_ses-02");
    }

    #[test]
    fn test_directory_layout() {
        let s = SubjectRef::new("sub-01", Some("ses-02".to_string()));
        let out = Path::new("/data/derivatives");
        assert_eq!(
            s.deriv_anat_dir(out),
            Path::new("/data/derivatives/cmp/sub-01/ses-02/anat")
        );
        assert_eq!(
            s.work_dir(out),
            Path::new("/data/derivatives/nipype/sub-01/ses-02")
        );
        assert_eq!(
            s.raw_t1w(Path::new("/data/bids")),
            Path::new("/data/bids/sub-01/ses-02/anat/sub-01_T1w.nii.gz")
        );
    }
}
