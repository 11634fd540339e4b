//! High-level SHSWorks client: one typed method per remote operation.
//!
//! Each wrapper supplies the opcode, validates argument shape before
//! anything touches the wire, and feeds the raw answer to the matching
//! decoder in [`crate::protocol::answer`]. The session engine underneath
//! handles connection lifecycle, job-id sequencing and busy-state recovery.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Result, ShsError};
use crate::models::{CamSettings, Camera, CamSetting, Evaluation, FieldPart, FieldStats, Number, ParamValue};
use crate::protocol::answer;
use crate::protocol::{Arg, Session};

/// File extensions SHSWorks accepts for measurement load/save.
const DATA_FILE_EXTENSIONS: [&str; 6] = ["big", "bix", "shw", "shz", "txt", "sha"];

/// Workspace-style extensions that address the whole field and therefore
/// reject a field-part selector.
const WORKSPACE_EXTENSIONS: [&str; 3] = ["shw", "shz", "sha"];

/// SHSWorks rejects load paths longer than this.
const MAX_LOAD_PATH_LENGTH: usize = 258;

/// Parameter flag that reports whether pass/fail evaluation is enabled.
const PASS_FAIL_FLAG: &str = "bPassFail";

/// Typed remote-control client for one SHSWorks instance.
///
/// Connects lazily on the first command; `close()` or dropping the client
/// releases the socket.
pub struct ShsClient {
    session: Session,
}

impl ShsClient {
    /// Client for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ShsClient {
            session: Session::new(host, port),
        }
    }

    /// Client from a settings file value.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut session = Session::new(config.host.clone(), config.port);
        session.set_busy_retry_limit(config.busy_retry_limit);
        ShsClient { session }
    }

    /// Client over an existing session.
    pub fn from_session(session: Session) -> Self {
        ShsClient { session }
    }

    /// The underlying session engine.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Connect now instead of lazily on the first command.
    pub fn connect(&mut self) -> Result<()> {
        self.session.connect()
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.session.close();
    }

    // Commands sorted by opcode

    /// "00" — a standard answer is returned without frame reading or
    /// evaluation.
    pub fn test(&mut self) -> Result<String> {
        self.session.send_command(0, &[])
    }

    /// "01" — open the live video dialog. Must be closed with
    /// [`close_live`](Self::close_live) before other commands can run.
    pub fn open_live(&mut self) -> Result<String> {
        self.session.send_command(1, &[])
    }

    /// "02" — take a frame into the original part of the active data field.
    pub fn grab_org(&mut self) -> Result<String> {
        self.session.send_command(2, &[])
    }

    /// "03" — take a frame into the reference part of the active data field.
    pub fn grab_ref(&mut self) -> Result<String> {
        self.session.send_command(3, &[])
    }

    /// "04" — perform an evaluation and return pass/fail values keyed by
    /// item index.
    pub fn evaluation(&mut self) -> Result<Evaluation> {
        let answer = self.session.send_command(4, &[])?;
        let indices = self.get_pf_indices()?;
        answer::process_evaluation(&answer, &indices)
    }

    /// "05" — load a named parameter setup.
    pub fn load_setup(&mut self, setup_name: &str) -> Result<String> {
        self.session.send_command(5, &[Arg::from(setup_name)])
    }

    /// "06" — import a parameter set from file. Bare filenames resolve
    /// against the SHSWorks config directory; full paths are accepted too.
    pub fn import_par(&mut self, par_file: impl AsRef<Path>) -> Result<String> {
        self.session
            .send_command(6, &[Arg::from(par_file.as_ref())])
    }

    /// "07" — indices of the pass/fail items in use.
    ///
    /// An empty answer triggers the configuration probe and reports
    /// [`ShsError::PassFailEvaluationOff`] or
    /// [`ShsError::NoPassFailItemsSelected`].
    pub fn get_pf_indices(&mut self) -> Result<Vec<i64>> {
        let answer = self.session.send_command(7, &[])?;
        let indices = integer_list(&answer)?;
        if indices.is_empty() {
            return Err(self.probe_pass_fail_config());
        }
        Ok(indices)
    }

    /// "08" — stop the live dialog.
    pub fn close_live(&mut self) -> Result<String> {
        self.session.send_command(8, &[])
    }

    /// "09" — camera settings per camera group, with the tokens accepted by
    /// [`set_cam_setting`](Self::set_cam_setting).
    pub fn get_cam_settings(&mut self) -> Result<CamSettings> {
        let answer = self.session.send_command(9, &[])?;
        answer::read_cam_settings(&answer)
    }

    /// "10" — set one camera parameter.
    pub fn set_cam_setting(
        &mut self,
        camera: Camera,
        setting: CamSetting,
        value: impl Into<Arg>,
    ) -> Result<String> {
        let assignment = format!("{}:{}={}", camera.as_str(), setting.as_str(), value.into());
        self.session.send_command(10, &[Arg::from(assignment)])
    }

    /// "11" — store the current absolute-tilt position (original part) as
    /// the calibration position.
    pub fn tilt_cal_org(&mut self) -> Result<String> {
        self.session.send_command(11, &[])
    }

    /// "12" — store the current absolute-tilt position (reference part) as
    /// the calibration position.
    pub fn tilt_cal_ref(&mut self) -> Result<String> {
        self.session.send_command(12, &[])
    }

    /// "13" — import spot data from a text file.
    pub fn import_spot_data(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ShsError::InvalidArgument(format!(
                "the specified path does not exist: {}",
                path.display()
            )));
        }
        self.session.send_command(13, &[Arg::from(path)])
    }

    /// "14" — export spot data to a text file.
    pub fn export_spot_data(&mut self, path: impl AsRef<Path>) -> Result<String> {
        self.session.send_command(14, &[Arg::from(path.as_ref())])
    }

    /// "15" — evaluation from spot data, keyed like
    /// [`evaluation`](Self::evaluation).
    pub fn eval_spot_data(&mut self) -> Result<Evaluation> {
        let answer = self.session.send_command(15, &[])?;
        let indices = self.get_pf_indices()?;
        answer::process_evaluation(&answer, &indices)
    }

    /// "16" — select the active data field for camera-frame reads.
    pub fn select_field(&mut self, field_id: i32) -> Result<String> {
        self.session.send_command(16, &[Arg::from(field_id)])
    }

    /// "17" — delete all fields of the SHS and AUX groups.
    pub fn delete_fields(&mut self) -> Result<String> {
        self.session.send_command(17, &[])
    }

    /// "18" — center the sample in live mode (PI motorization only).
    pub fn center_sample(&mut self) -> Result<String> {
        self.session.send_command(18, &[])
    }

    /// "19" — status of the live-mode sample centering.
    pub fn get_center_sample_state(&mut self) -> Result<String> {
        self.session.send_command(19, &[])
    }

    /// "20" — names of the pass/fail items that are switched on.
    ///
    /// Same empty-answer probe as [`get_pf_indices`](Self::get_pf_indices).
    pub fn get_pf_names(&mut self) -> Result<Vec<String>> {
        let answer = self.session.send_command(20, &[])?;
        let names = answer::read_list(&answer)?;
        if names.is_empty() {
            return Err(self.probe_pass_fail_config());
        }
        Ok(names)
    }

    /// "21" — SHSWorks version string, e.g.
    /// `12.000.1 (SVN1178) (September 8 2020)`.
    pub fn get_version(&mut self) -> Result<String> {
        let answer = self.session.send_command(21, &[])?;
        answer::result_field(&answer)
    }

    /// "22" — index of the first Zernike coefficient in the pass/fail list.
    pub fn get_first_zernike_index(&mut self) -> Result<i64> {
        let answer = self.session.send_command(22, &[])?;
        integer_result(&answer)
    }

    /// "23" — number of Zernike coefficients in the pass/fail list.
    pub fn get_number_of_zernikes(&mut self) -> Result<i64> {
        let answer = self.session.send_command(23, &[])?;
        integer_result(&answer)
    }

    /// "24" — values of the last pass/fail evaluation, in item order.
    ///
    /// Same empty-answer probe as [`get_pf_indices`](Self::get_pf_indices).
    pub fn get_pf_values(&mut self) -> Result<Vec<Number>> {
        let answer = self.session.send_command(24, &[])?;
        let values = answer::read_numbers(&answer)?;
        if values.is_empty() {
            return Err(self.probe_pass_fail_config());
        }
        Ok(values)
    }

    /// "25" — total result of the last pass/fail evaluation.
    pub fn get_pf_result(&mut self) -> Result<bool> {
        let answer = self.session.send_command(25, &[])?;
        answer::read_bool(&answer)
    }

    /// "26" — value of a named parameter, decoded per the parameter's
    /// fixed classification.
    pub fn get_par(&mut self, par: &str) -> Result<ParamValue> {
        let answer = self.session.send_command(26, &[Arg::from(par)])?;
        let value = answer::read_parameter(par, &answer)?;
        answer::classify_parameter(par, value)
    }

    /// "27" — set the value of a named parameter.
    pub fn set_par(&mut self, par: &str, value: impl Into<Arg>) -> Result<String> {
        let assignment = format!("{par}={}", value.into());
        let answer = self.session.send_command(27, &[Arg::from(assignment)])?;
        // the echo must name the parameter we set
        answer::read_parameter(par, &answer)?;
        Ok(answer)
    }

    /// "28" — value of one specific pass/fail item.
    pub fn get_pf_item_value(&mut self, pf_index: i64) -> Result<Number> {
        let answer = self.session.send_command(28, &[Arg::from(pf_index)])?;
        answer::read_number(&answer)
    }

    /// "29" — pass (true) or fail (false) of one specific pass/fail item.
    pub fn get_pf_item_result(&mut self, pf_index: i64) -> Result<bool> {
        let answer = self.session.send_command(29, &[Arg::from(pf_index)])?;
        answer::read_bool(&answer)
    }

    /// "30" — load a measurement file. `field_part` selects ORG/REF/BOTH
    /// for frame formats and must be omitted for workspace formats
    /// (`shw`, `shz`, `sha`).
    pub fn load_file(
        &mut self,
        path: impl AsRef<Path>,
        field_part: Option<FieldPart>,
    ) -> Result<String> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ShsError::InvalidArgument(format!(
                "the specified path does not exist: {}",
                path.display()
            )));
        }
        check_data_extension(path)?;
        if path.to_string_lossy().len() > MAX_LOAD_PATH_LENGTH {
            return Err(ShsError::InvalidArgument(format!(
                "the specified path is too long: {}",
                path.display()
            )));
        }
        match field_part {
            None => self.session.send_command(30, &[Arg::from(path)]),
            Some(part) => {
                check_field_part_applies(path)?;
                self.session
                    .send_command(30, &[Arg::from(path), Arg::from(part.as_str())])
            }
        }
    }

    /// "31" — save the current measurement to file.
    pub fn save_file(
        &mut self,
        path: impl AsRef<Path>,
        field_part: Option<FieldPart>,
    ) -> Result<String> {
        let path = path.as_ref();
        check_data_extension(path)?;
        match field_part {
            None => self.session.send_command(31, &[Arg::from(path)]),
            Some(part) => {
                check_field_part_applies(path)?;
                self.session
                    .send_command(31, &[Arg::from(path), Arg::from(part.as_str())])
            }
        }
    }

    /// "32" — set the storage path for post-evaluation files.
    pub fn set_output_path(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(ShsError::InvalidArgument(format!(
                "the output path must be a directory: {}",
                path.display()
            )));
        }
        self.session.send_command(32, &[Arg::from(path)])
    }

    /// "33" — set the base filename for post-evaluation files.
    pub fn set_output_name(&mut self, name: &str) -> Result<String> {
        self.session.send_command(33, &[Arg::from(name)])
    }

    /// "34" — copy field data between fields (e.g. measurement → AUX).
    pub fn copy_data_from_to(&mut self, from_field: i32, to_field: i32) -> Result<String> {
        let range = format!("{from_field}-{to_field}");
        self.session.send_command(34, &[Arg::from(range)])
    }

    /// "35" — statistical field information for one field part.
    /// `field_part` must be [`FieldPart::Org`] or [`FieldPart::Ref`].
    pub fn get_field_stats(&mut self, field_id: i32, field_part: FieldPart) -> Result<FieldStats> {
        if field_part == FieldPart::Both {
            return Err(ShsError::InvalidArgument(
                "field statistics address a single part; use ORG or REF".to_string(),
            ));
        }
        let answer = self
            .session
            .send_command(35, &[Arg::from(field_id), Arg::from(field_part.as_str())])?;
        answer::read_stats(&answer)
    }

    /// "36" — the "Use" state of a specific pass/fail item.
    pub fn get_pf_item_use(&mut self, pf_index: i64) -> Result<bool> {
        let answer = self.session.send_command(36, &[Arg::from(pf_index)])?;
        answer::read_bool(&answer)
    }

    /// "37" — switch the "Use" state of a specific pass/fail item.
    pub fn set_pf_item_use(&mut self, pf_index: i64, used: bool) -> Result<String> {
        self.session
            .send_command(37, &[Arg::from(pf_index), Arg::from(i64::from(used))])
    }

    /// "38" — save the current parameter setup under a name.
    pub fn save_setup(&mut self, setup_name: &str) -> Result<String> {
        self.session.send_command(38, &[Arg::from(setup_name)])
    }

    /// "39" — save the VCC image as a bitmap file.
    pub fn save_vcc_bmp(&mut self, bmp_path: impl AsRef<Path>) -> Result<String> {
        let path = bmp_path.as_ref();
        if path.extension().and_then(|ext| ext.to_str()) != Some("bmp") {
            return Err(ShsError::InvalidArgument(format!(
                "the filename suffix must be \".bmp\": {}",
                path.display()
            )));
        }
        let answer = self.session.send_command(39, &[Arg::from(path)])?;
        answer::result_field(&answer)
    }

    /// "40" — save the radial power map as CSV.
    pub fn save_radial_power_map(
        &mut self,
        n_samples: i32,
        n_max_avg_points: i32,
        path: impl AsRef<Path>,
    ) -> Result<String> {
        let path = path.as_ref();
        if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
            return Err(ShsError::InvalidArgument(format!(
                "the filename suffix must be \".csv\": {}",
                path.display()
            )));
        }
        self.session.send_command(
            40,
            &[
                Arg::from(n_samples),
                Arg::from(n_max_avg_points),
                Arg::from(path),
            ],
        )
    }

    /// "41" — radial power map statistics.
    pub fn get_radial_power_map_stats(
        &mut self,
        n_samples: i32,
        n_max_avg_points: i32,
    ) -> Result<FieldStats> {
        let answer = self
            .session
            .send_command(41, &[Arg::from(n_samples), Arg::from(n_max_avg_points)])?;
        answer::read_stats(&answer)
    }

    /// "42" (with argument) — enable or disable SHS freerun.
    pub fn set_shs_freerun_state(&mut self, enabled: bool) -> Result<String> {
        self.session
            .send_command(42, &[Arg::from(i64::from(enabled))])
    }

    /// "42" (without argument) — current SHS freerun state.
    pub fn get_shs_freerun_state(&mut self) -> Result<bool> {
        let answer = self.session.send_command(42, &[])?;
        answer::read_bool(&answer)
    }

    /// "43" — open the connection to the cameras.
    pub fn open_cameras(&mut self) -> Result<String> {
        self.session.send_command(43, &[])
    }

    /// "44" — close the connection to the cameras.
    pub fn close_cameras(&mut self) -> Result<String> {
        self.session.send_command(44, &[])
    }

    /// "45" — set the ImProc2.cfg path. `None` resets to the default.
    pub fn set_improc_cfg_path(&mut self, path: Option<&Path>) -> Result<String> {
        let arg = match path {
            Some(path) => Arg::from(path),
            None => Arg::from(""),
        };
        self.session.send_command(45, &[arg])
    }

    // Composite helpers

    /// Total number of pass/fail items (Zernike count + first Zernike
    /// index).
    pub fn get_number_of_pf_items(&mut self) -> Result<i64> {
        let zernikes = self.get_number_of_zernikes()?;
        let first_zernike = self.get_first_zernike_index()?;
        Ok(zernikes + first_zernike)
    }

    /// Switch the listed pass/fail items on and every other item off.
    pub fn select_pf_items(&mut self, pf_items: &[i64]) -> Result<()> {
        let n_items = self.get_number_of_pf_items()?;
        for index in 0..n_items {
            self.set_pf_item_use(index, pf_items.contains(&index))?;
        }
        Ok(())
    }

    /// Set every parameter in the map, in iteration order.
    pub fn set_pars(&mut self, pars: &BTreeMap<String, Arg>) -> Result<()> {
        for (par, value) in pars {
            self.set_par(par, value.clone())?;
        }
        Ok(())
    }

    /// Active pass/fail item names keyed by their indices.
    pub fn get_pf_names_by_index(&mut self) -> Result<BTreeMap<i64, String>> {
        let indices = self.get_pf_indices()?;
        let names = self.get_pf_names()?;
        Ok(indices.into_iter().zip(names).collect())
    }

    /// Second round trip behind the empty pass/fail convention: decide
    /// whether the evaluation is switched off or merely has no items
    /// selected.
    fn probe_pass_fail_config(&mut self) -> ShsError {
        debug!("pass/fail query came back empty, probing {PASS_FAIL_FLAG}");
        match self.get_par(PASS_FAIL_FLAG) {
            Ok(value) => {
                if value.as_number().is_some_and(Number::is_truthy) {
                    ShsError::NoPassFailItemsSelected
                } else {
                    ShsError::PassFailEvaluationOff
                }
            }
            Err(err) => err,
        }
    }
}

/// Decode a number-list answer whose entries must all be integral.
fn integer_list(raw_answer: &str) -> Result<Vec<i64>> {
    answer::read_numbers(raw_answer)?
        .into_iter()
        .map(|number| {
            number.as_i64().ok_or_else(|| {
                ShsError::UnexpectedFormat(format!("expected an integer index, got {number}"))
            })
        })
        .collect()
}

/// Decode a scalar answer that must be integral.
fn integer_result(raw_answer: &str) -> Result<i64> {
    let number = answer::read_number(raw_answer)?;
    number.as_i64().ok_or_else(|| {
        ShsError::UnexpectedFormat(format!("expected an integer, got {number}"))
    })
}

fn check_data_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if !DATA_FILE_EXTENSIONS.contains(&extension) {
        return Err(ShsError::InvalidArgument(format!(
            "invalid SHSWorks extension {extension:?}: {}",
            path.display()
        )));
    }
    Ok(())
}

fn check_field_part_applies(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if WORKSPACE_EXTENSIONS.contains(&extension) {
        return Err(ShsError::InvalidArgument(format!(
            "a field part cannot be specified for the file type {extension:?}"
        )));
    }
    Ok(())
}
