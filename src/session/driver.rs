use crate::matcher::{self, ModePrompts};
use crate::operator::candidate_prompts;
use crate::protocol::{CmdResult, CmdStatus, RpcError};

use super::*;

impl SessionDriver {
    /// Opens a session: reads from the transport until one of the start-mode
    /// prompts matches the buffer tail, then pins the resolved mode.
    ///
    /// A disjunction start mode (Cisco's login or login-enable) collapses to
    /// whichever member's prompt is observed first; all later navigation
    /// plans from that member.
    pub async fn open(
        transport: Transport,
        operator: Arc<dyn Operator>,
        log_prefix: String,
        limit: Duration,
    ) -> Result<SessionDriver, CliError> {
        let start_modes = operator.start_modes();
        let candidates = candidate_prompts(operator.as_ref(), &start_modes);
        if candidates.is_empty() {
            return Err(CliError::InvalidOperator(format!(
                "start mode {} has no prompt patterns",
                operator.start_mode()
            )));
        }

        let mut driver = SessionDriver {
            transport,
            operator,
            current_mode: String::new(),
            home_mode: String::new(),
            prompt: String::new(),
            log_prefix,
        };

        let mut captured = String::new();
        let mode = match driver.read_until(&candidates, None, limit, &mut captured).await {
            Ok(mode) => mode,
            Err(CliError::ReadTimeout(partial)) => {
                return Err(CliError::InitialPromptTimeout(if partial.is_empty() {
                    "no output before the open deadline".to_string()
                } else {
                    partial
                }));
            }
            Err(err) => return Err(err),
        };
        debug!(
            "{} start prompt {:?} resolved to mode {}",
            driver.log_prefix, driver.prompt, mode
        );
        driver.current_mode = mode.clone();
        driver.home_mode = mode;
        Ok(driver)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn current_mode(&self) -> &str {
        &self.current_mode
    }

    /// Runs a request against the opened session: navigates to the requested
    /// mode, then executes the command batch. Navigation failures replace
    /// the results; mid-batch session failures truncate them.
    pub async fn execute(&mut self, request: &CliRequest) -> CliResponse {
        let per_cmd = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CMD_TIMEOUT);

        if let Err(err) = self.ensure_mode(&request.mode, per_cmd).await {
            debug!("{} navigation failed: {err}", self.log_prefix);
            return CliResponse::from_error(err.kind(), err.to_string());
        }

        let (results, fatal) = self.run_commands(&request.commands, per_cmd).await;
        let err = fatal.map(|err| RpcError {
            kind: err.kind(),
            message: err.to_string(),
        });
        CliResponse::from_results(results, err)
    }

    /// Moves the device from the current mode to `target` using the
    /// operator's transition table.
    ///
    /// Transition entries may carry embedded line breaks (multi-step macros
    /// such as `config vdom\n\tedit X`); every step is transmitted with the
    /// operator line break and a prompt must be observed before the next
    /// step goes out. The final step must land on the target mode's prompt,
    /// anything else is a lost transition and the caller decides.
    pub async fn ensure_mode(&mut self, target: &str, limit: Duration) -> Result<(), CliError> {
        if self.current_mode == target {
            return Ok(());
        }

        let batches = self
            .operator
            .transition(&self.current_mode, target)
            .ok_or_else(|| self.no_transition(target))?;
        let steps: Vec<String> = batches
            .iter()
            .flat_map(|batch| batch.split('\n'))
            .filter(|step| !step.is_empty())
            .map(str::to_string)
            .collect();
        // An empty entry for distinct modes carries the same meaning as a
        // missing one.
        if steps.is_empty() {
            return Err(self.no_transition(target));
        }

        let target_mode = target.to_string();
        let target_candidates =
            candidate_prompts(self.operator.as_ref(), std::slice::from_ref(&target_mode));
        if target_candidates.is_empty() {
            return Err(self.no_transition(target));
        }
        let step_candidates = self.step_candidates();

        let last = steps.len() - 1;
        for (idx, step) in steps.iter().enumerate() {
            debug!("{} transition step: {}", self.log_prefix, step);
            self.write_line(step, limit).await?;
            let candidates = if idx == last {
                &target_candidates
            } else {
                &step_candidates
            };
            let mut captured = String::new();
            match self.read_until(candidates, Some(step), limit, &mut captured).await {
                Ok(_) => {}
                Err(CliError::ReadTimeout(_)) => {
                    return Err(CliError::TransitionLost(target.to_string()));
                }
                Err(err) => return Err(err),
            }
        }

        self.current_mode = target.to_string();
        Ok(())
    }

    fn no_transition(&self, dst: &str) -> CliError {
        CliError::NoTransition {
            src: self.current_mode.clone(),
            dst: dst.to_string(),
        }
    }

    /// Prompt candidates delimiting intermediate transition steps: every
    /// registered mode, plus the operator's loose step pattern when it has
    /// one (for macros passing through unregistered contexts).
    fn step_candidates(&self) -> Vec<ModePrompts> {
        let mut candidates = candidate_prompts(self.operator.as_ref(), &self.operator.modes());
        if let Some(loose) = self.operator.intermediate_prompt() {
            candidates.push(("transition-step".to_string(), vec![loose]));
        }
        candidates
    }

    /// Executes the batch in submission order, one command in flight at a
    /// time. Device-reported errors flag the result and the batch continues;
    /// a timed-out command gets one resync read to the next prompt, and only
    /// a failed resync tears the session down, reporting the remaining
    /// commands as not attempted.
    pub async fn run_commands(
        &mut self,
        commands: &[String],
        per_cmd: Duration,
    ) -> (Vec<CmdResult>, Option<CliError>) {
        let mut results = Vec::with_capacity(commands.len());
        let mut fatal: Option<CliError> = None;
        let candidates =
            candidate_prompts(self.operator.as_ref(), std::slice::from_ref(&self.current_mode));

        for command in commands {
            if fatal.is_some() {
                results.push(CmdResult::not_attempted(command));
                continue;
            }
            match self.run_one(command, &candidates, per_cmd).await {
                Ok(result) => results.push(result),
                Err(CliError::ReadTimeout(partial)) => {
                    debug!("{} read timeout on {:?}", self.log_prefix, command);
                    results.push(self.finish(command, partial, CmdStatus::ReadTimeout, true));
                    if let Err(err) = self.resync(&candidates, per_cmd).await {
                        debug!("{} resync failed: {err}", self.log_prefix);
                        fatal = Some(err);
                    }
                }
                Err(CliError::WriteTimeout) => {
                    debug!("{} write timeout on {:?}", self.log_prefix, command);
                    results.push(self.finish(
                        command,
                        String::new(),
                        CmdStatus::WriteTimeout,
                        true,
                    ));
                    if let Err(err) = self.resync(&candidates, per_cmd).await {
                        fatal = Some(err);
                    }
                }
                Err(err) => {
                    results.push(CmdResult::not_attempted(command));
                    fatal = Some(err);
                }
            }
        }

        (results, fatal)
    }

    async fn run_one(
        &mut self,
        command: &str,
        candidates: &[ModePrompts],
        per_cmd: Duration,
    ) -> Result<CmdResult, CliError> {
        self.transport.try_drain();
        self.write_line(command, per_cmd).await?;
        let mut captured = String::new();
        self.read_until(candidates, Some(command), per_cmd, &mut captured)
            .await?;
        Ok(self.finish(command, captured, CmdStatus::Done, false))
    }

    /// Turns raw captured bytes into a per-command result: echo stripped,
    /// trailing prompt dropped, error patterns scanned before excludes are
    /// filtered, operator decoding applied last.
    fn finish(&self, command: &str, raw: String, status: CmdStatus, truncated: bool) -> CmdResult {
        let body = matcher::strip_echo(&raw, command);
        let body = if status == CmdStatus::Done {
            match body.rfind('\n') {
                Some(pos) => &body[..pos],
                None => "",
            }
        } else {
            body
        };

        let matched_error = matcher::first_error_line(body, self.operator.error_patterns())
            .map(str::to_string);
        let output = matcher::apply_excludes(body, self.operator.excludes());
        let output = matcher::decode_output(self.operator.encoding(), output);

        CmdResult {
            command: command.to_string(),
            output,
            matched_error,
            truncated,
            status,
        }
    }

    /// One attempt to regain the prompt after a timed-out command.
    async fn resync(
        &mut self,
        candidates: &[ModePrompts],
        limit: Duration,
    ) -> Result<(), CliError> {
        debug!(
            "{} resynchronizing to the {} prompt",
            self.log_prefix, self.current_mode
        );
        let mut captured = String::new();
        self.read_until(candidates, None, limit, &mut captured)
            .await
            .map(|_| ())
    }

    async fn write_line(&mut self, text: &str, limit: Duration) -> Result<(), CliError> {
        let data = format!("{text}{}", self.operator.line_break());
        self.transport.send_timeout(data, limit).await
    }

    /// Accumulates chunks until a candidate prompt matches the un-terminated
    /// buffer tail, appending cleaned output to `captured` as lines
    /// complete. Returns the matched mode name.
    ///
    /// When `echo_of` is set, prompt detection is held back until the first
    /// occurrence of the transmitted command has been located; only output
    /// past the echo is eligible, since the device may repeat the previous
    /// prompt together with the command.
    async fn read_until(
        &mut self,
        candidates: &[ModePrompts],
        echo_of: Option<&str>,
        limit: Duration,
        captured: &mut String,
    ) -> Result<String, CliError> {
        let transport = &mut self.transport;
        let mut line_buffer = String::new();
        let mut echo_seen = echo_of.is_none();

        let outcome = tokio::time::timeout(limit, async {
            loop {
                let Some(chunk) = transport.recv().await else {
                    return Err(CliError::ChannelClosed);
                };
                trace!("{chunk:?}");
                line_buffer.push_str(&chunk);

                while let Some(newline_pos) = line_buffer.find('\n') {
                    let line: String = line_buffer.drain(..=newline_pos).collect();
                    let cleaned = matcher::clean_line(&line);
                    if !echo_seen
                        && let Some(command) = echo_of
                        && cleaned.contains(command)
                    {
                        echo_seen = true;
                    }
                    captured.push_str(&cleaned);
                }

                if line_buffer.is_empty() {
                    continue;
                }
                let tail = match (echo_seen, echo_of) {
                    (false, Some(command)) => match matcher::find_echo(&line_buffer, command) {
                        Some(end) => {
                            echo_seen = true;
                            &line_buffer[end..]
                        }
                        None => continue,
                    },
                    _ => line_buffer.as_str(),
                };
                if let Some(mode) = matcher::match_tail(tail, candidates) {
                    let mode = mode.to_string();
                    captured.push_str(&line_buffer);
                    return Ok((mode, std::mem::take(&mut line_buffer)));
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok((mode, prompt))) => {
                self.prompt = prompt;
                Ok(mode)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(CliError::ReadTimeout(captured.clone())),
        }
    }

    /// Steers the device back toward the start mode, then releases the
    /// transport. The homeward transition is best effort; correctness only
    /// requires the release.
    pub async fn close(mut self) {
        if self.current_mode != self.home_mode
            && let Some(batches) = self.operator.transition(&self.current_mode, &self.home_mode)
        {
            let home = candidate_prompts(
                self.operator.as_ref(),
                std::slice::from_ref(&self.home_mode),
            );
            let steps: Vec<String> = batches
                .iter()
                .flat_map(|batch| batch.split('\n'))
                .filter(|step| !step.is_empty())
                .map(str::to_string)
                .collect();
            for step in steps {
                if self.write_line(&step, CLOSE_TIMEOUT).await.is_err() {
                    break;
                }
                let mut scratch = String::new();
                if self
                    .read_until(&home, Some(&step), CLOSE_TIMEOUT, &mut scratch)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
        self.transport.close().await;
        debug!("{} session released", self.log_prefix);
    }
}
