//! Naming-substitution tables.
//!
//! The sink renames raw tool output files into derivative names; which table
//! applies depends on the selected segmentation tool, since the tool choice
//! changes both the producer filenames and the destination vocabulary. Each
//! table maps one canonical producer name per artifact, so the mapping is
//! injective: no two sources share a destination.

use crate::bids::derivatives::{
    atlas_color_lut, atlas_graphml, atlas_stats, atlas_volume, DESC_APARCASEG_DSEG,
    DESC_ASEG_DSEG, DESC_BRAINMASK_DSEG, DESC_BRAIN_T1W, DESC_HEAD_T1W, LABEL_GM_DSEG,
    LABEL_WM_DSEG, SCALES,
};
use crate::config::SegmentationTool;

/// The substitution table for the given tool, with `prefix` the derivative
/// filename prefix (`sub-01` or `sub-01_ses-01`).
pub fn substitutions_for(tool: SegmentationTool, prefix: &str) -> Vec<(String, String)> {
    match tool {
        SegmentationTool::Freesurfer => freesurfer_substitutions(prefix),
        SegmentationTool::Custom => custom_substitutions(prefix),
    }
}

fn freesurfer_substitutions(prefix: &str) -> Vec<(String, String)> {
    let named = |suffix: &str| format!("{prefix}_{suffix}");
    let mut subs = vec![
        ("T1.nii.gz".to_string(), named(DESC_HEAD_T1W)),
        ("brain.nii.gz".to_string(), named(DESC_BRAIN_T1W)),
        ("brain_mask.nii.gz".to_string(), named(DESC_BRAINMASK_DSEG)),
        ("aseg.nii.gz".to_string(), named(DESC_ASEG_DSEG)),
        ("fsmask_1mm.nii.gz".to_string(), named(LABEL_WM_DSEG)),
        ("T1w_class-GM.nii.gz".to_string(), named(LABEL_GM_DSEG)),
        (
            "aparc+aseg.Lausanne2018.native.nii.gz".to_string(),
            named(DESC_APARCASEG_DSEG),
        ),
    ];
    for scale in SCALES {
        subs.push((
            format!("roi_stats_scale{scale}.tsv"),
            named(&atlas_stats(scale)),
        ));
        subs.push((
            format!("ROIv_HR_th_scale{scale}.nii.gz"),
            named(&atlas_volume(scale)),
        ));
        subs.push((
            format!("ROIv_HR_th_scale{scale}.graphml"),
            named(&atlas_graphml(scale)),
        ));
        subs.push((
            format!("ROIv_HR_th_scale{scale}_FreeSurferColorLUT.txt"),
            named(&atlas_color_lut(scale)),
        ));
    }
    subs
}

fn custom_substitutions(prefix: &str) -> Vec<(String, String)> {
    let mut subs = vec![
        (
            format!("{prefix}_T1w.nii.gz"),
            format!("{prefix}_T1w_head.nii.gz"),
        ),
        (
            "brain.nii.gz".to_string(),
            format!("{prefix}_T1w_brain.nii.gz"),
        ),
        (
            "brain_mask.nii.gz".to_string(),
            format!("{prefix}_T1w_brainmask.nii.gz"),
        ),
        (
            "brainmask_eroded.nii.gz".to_string(),
            format!("{prefix}_T1w_brainmask_eroded.nii.gz"),
        ),
        (
            "fsmask_1mm.nii.gz".to_string(),
            format!("{prefix}_T1w_class-WM.nii.gz"),
        ),
        (
            "fsmask_1mm_eroded.nii.gz".to_string(),
            format!("{prefix}_T1w_class-WM_eroded.nii.gz"),
        ),
        (
            "csf_mask_eroded.nii.gz".to_string(),
            format!("{prefix}_T1w_class-CSF_eroded.nii.gz"),
        ),
        (
            "T1w_class-GM.nii.gz".to_string(),
            format!("{prefix}_T1w_class-GM.nii.gz"),
        ),
    ];
    for scale in SCALES {
        subs.push((
            format!("ROIv_HR_th_scale{scale}.nii.gz"),
            format!("{prefix}_T1w_parc_scale{scale}.nii.gz"),
        ));
    }
    subs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_injective(subs: &[(String, String)]) {
        let sources: HashSet<&String> = subs.iter().map(|(from, _)| from).collect();
        assert_eq!(sources.len(), subs.len(), "duplicate source filename");
        let dests: HashSet<&String> = subs.iter().map(|(_, to)| to).collect();
        assert_eq!(dests.len(), subs.len(), "two sources map to one destination");
    }

    #[test]
    fn test_freesurfer_table_is_injective() {
        assert_injective(&substitutions_for(SegmentationTool::Freesurfer, "sub-01"));
    }

    #[test]
    fn test_custom_table_is_injective() {
        assert_injective(&substitutions_for(SegmentationTool::Custom, "sub-01"));
    }

    #[test]
    fn test_freesurfer_table_covers_every_scale() {
        let subs = substitutions_for(SegmentationTool::Freesurfer, "sub-01_ses-01");
        for scale in SCALES {
            for source in [
                format!("ROIv_HR_th_scale{scale}.nii.gz"),
                format!("ROIv_HR_th_scale{scale}.graphml"),
                format!("ROIv_HR_th_scale{scale}_FreeSurferColorLUT.txt"),
                format!("roi_stats_scale{scale}.tsv"),
            ] {
                assert!(
                    subs.iter().any(|(from, _)| *from == source),
                    "no entry for {source}"
                );
            }
        }
    }

    #[test]
    fn test_session_prefix_lands_in_destinations() {
        let subs = substitutions_for(SegmentationTool::Freesurfer, "sub-01_ses-01");
        let (_, head) = subs.iter().find(|(from, _)| from == "T1.nii.gz").unwrap();
        assert_eq!(head, "sub-01_ses-01_desc-head_T1w.nii.gz");
    }
}
