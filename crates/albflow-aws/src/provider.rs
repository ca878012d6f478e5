//! CloudFormation provisioner

use crate::error::{AwsError, Result};
use crate::events::{EventLog, convert_event, is_missing_stack, is_no_op_update, to_chrono};
use albflow_template::provisioner::{is_success_status, is_terminal_status};
use albflow_template::{
    AccountScope, AuthStatus, PollConfig, Provisioner, StackDescription, StackOperation,
    SubmissionOutcome, Template,
};
use async_trait::async_trait;
use aws_sdk_cloudformation::Client as CloudFormationClient;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{Capability, Stack};
use aws_sdk_sts::Client as StsClient;
use std::collections::BTreeMap;
use std::time::Instant;

/// Submits templates to CloudFormation and waits for the stack to settle
pub struct CloudFormationProvisioner {
    cloudformation: CloudFormationClient,
    sts: StsClient,
    region: Option<String>,
    poll: PollConfig,
}

impl CloudFormationProvisioner {
    /// Build clients from the default credential and region chain
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let region = config.region().map(|r| r.to_string());
        tracing::debug!("AWS region: {}", region.as_deref().unwrap_or("(unset)"));
        Self {
            cloudformation: CloudFormationClient::new(&config),
            sts: StsClient::new(&config),
            region,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    async fn find_stack(&self, stack_name: &str) -> Result<Option<Stack>> {
        match self
            .cloudformation
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(output) => Ok(output.stacks().first().cloned()),
            Err(err) if err.message().is_some_and(is_missing_stack) => Ok(None),
            Err(err) => Err(AwsError::api(
                "DescribeStacks",
                DisplayErrorContext(&err).to_string(),
            )),
        }
    }

    /// Event ids already present on the stack
    async fn existing_events(&self, stack_id: &str, log: &mut EventLog) -> Result<()> {
        let output = self
            .cloudformation
            .describe_stack_events()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| {
                AwsError::api("DescribeStackEvents", DisplayErrorContext(&e).to_string())
            })?;
        for event in output.stack_events() {
            if let Some(id) = event.event_id() {
                log.ignore(id);
            }
        }
        Ok(())
    }

    async fn collect_events(&self, stack_id: &str, log: &mut EventLog) -> Result<()> {
        let output = self
            .cloudformation
            .describe_stack_events()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| {
                AwsError::api("DescribeStackEvents", DisplayErrorContext(&e).to_string())
            })?;
        // Newest first
        for event in output.stack_events().iter().rev() {
            if let Some((id, event)) = convert_event(event) {
                log.observe(id, event);
            }
        }
        Ok(())
    }

    /// Poll until the stack reaches a terminal status
    async fn wait(
        &self,
        stack_id: &str,
        mut outcome: SubmissionOutcome,
        mut log: EventLog,
        started: Instant,
    ) -> Result<SubmissionOutcome> {
        loop {
            tokio::time::sleep(self.poll.interval).await;
            self.collect_events(stack_id, &mut log).await?;

            let stack = self
                .find_stack(stack_id)
                .await?
                .ok_or_else(|| AwsError::StackNotFound(stack_id.to_string()))?;
            let status = stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .ok_or(AwsError::MissingField("StackStatus"))?;
            tracing::debug!("{} is {}", outcome.stack_name, status);

            if is_terminal_status(&status) {
                let expected = match outcome.operation {
                    StackOperation::Delete => status == "DELETE_COMPLETE",
                    _ => is_success_status(&status) && status != "DELETE_COMPLETE",
                };
                outcome.status_reason = stack.stack_status_reason().map(str::to_string);
                outcome.events = log.into_events();
                outcome.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(outcome.complete(status, expected));
            }
        }
    }

    async fn create(&self, template_body: String, stack_name: &str) -> Result<String> {
        let output = self
            .cloudformation
            .create_stack()
            .stack_name(stack_name)
            .template_body(template_body)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(|e| AwsError::api("CreateStack", DisplayErrorContext(&e).to_string()))?;
        output
            .stack_id()
            .map(str::to_string)
            .ok_or(AwsError::MissingField("StackId"))
    }

    /// `Ok(false)` when there is nothing to update
    async fn update(&self, template_body: String, stack_id: &str) -> Result<bool> {
        match self
            .cloudformation
            .update_stack()
            .stack_name(stack_id)
            .template_body(template_body)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.message().is_some_and(is_no_op_update) => Ok(false),
            Err(err) => Err(AwsError::api(
                "UpdateStack",
                DisplayErrorContext(&err).to_string(),
            )),
        }
    }

    async fn submit_stack(
        &self,
        template: &Template,
        stack_name: &str,
    ) -> Result<SubmissionOutcome> {
        let body = template.to_json()?;
        let started = Instant::now();
        let mut log = EventLog::new();

        match self.find_stack(stack_name).await? {
            None => {
                tracing::info!("Creating stack {}", stack_name);
                let stack_id = self.create(body, stack_name).await?;
                let mut outcome = SubmissionOutcome::new(stack_name, StackOperation::Create);
                outcome.stack_id = Some(stack_id.clone());
                self.wait(&stack_id, outcome, log, started).await
            }
            Some(stack) => {
                let stack_id = stack
                    .stack_id()
                    .map(str::to_string)
                    .ok_or(AwsError::MissingField("StackId"))?;
                let status = stack
                    .stack_status()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default();
                if status == "ROLLBACK_COMPLETE" {
                    return Err(AwsError::api(
                        "UpdateStack",
                        format!(
                            "{} is in ROLLBACK_COMPLETE and cannot be updated; delete it first",
                            stack_name
                        ),
                    ));
                }

                self.existing_events(&stack_id, &mut log).await?;
                tracing::info!("Updating stack {}", stack_name);
                let mut outcome = SubmissionOutcome::new(stack_name, StackOperation::Update);
                outcome.stack_id = Some(stack_id.clone());

                if self.update(body, &stack_id).await? {
                    self.wait(&stack_id, outcome, log, started).await
                } else {
                    tracing::info!("{} is already up to date", stack_name);
                    outcome.operation = StackOperation::NoOp;
                    outcome.duration_ms = started.elapsed().as_millis() as u64;
                    Ok(outcome.complete(status, true))
                }
            }
        }
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<SubmissionOutcome> {
        let started = Instant::now();
        let stack = self
            .find_stack(stack_name)
            .await?
            .ok_or_else(|| AwsError::StackNotFound(stack_name.to_string()))?;
        let stack_id = stack
            .stack_id()
            .map(str::to_string)
            .ok_or(AwsError::MissingField("StackId"))?;

        let mut log = EventLog::new();
        self.existing_events(&stack_id, &mut log).await?;

        tracing::info!("Deleting stack {}", stack_name);
        self.cloudformation
            .delete_stack()
            .stack_name(&stack_id)
            .send()
            .await
            .map_err(|e| AwsError::api("DeleteStack", DisplayErrorContext(&e).to_string()))?;

        let mut outcome = SubmissionOutcome::new(stack_name, StackOperation::Delete);
        outcome.stack_id = Some(stack_id.clone());
        self.wait(&stack_id, outcome, log, started).await
    }

    async fn caller_scope(&self) -> Result<AccountScope> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| AwsError::AuthenticationFailed(DisplayErrorContext(&e).to_string()))?;
        let account = identity.account().ok_or(AwsError::MissingAccount)?;

        let mut scope = AccountScope::new(account);
        scope.caller_arn = identity.arn().map(str::to_string);
        if let Some(region) = &self.region {
            scope = scope.with_region(region);
        }
        Ok(scope)
    }
}

fn stack_description(stack: &Stack, stack_name: &str) -> StackDescription {
    let outputs: BTreeMap<String, String> = stack
        .outputs()
        .iter()
        .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
        .collect();
    StackDescription {
        stack_name: stack_name.to_string(),
        stack_id: stack.stack_id().map(str::to_string),
        status: stack
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        status_reason: stack.stack_status_reason().map(str::to_string),
        outputs,
        last_updated: stack
            .last_updated_time()
            .or(stack.creation_time())
            .and_then(to_chrono),
    }
}

#[async_trait]
impl Provisioner for CloudFormationProvisioner {
    fn name(&self) -> &str {
        "cloudformation"
    }

    fn display_name(&self) -> &str {
        "AWS CloudFormation"
    }

    async fn check_auth(&self) -> albflow_template::Result<AuthStatus> {
        match self.caller_scope().await {
            Ok(scope) => {
                let account_info = match (&scope.caller_arn, &scope.region) {
                    (Some(arn), Some(region)) => format!("{} ({})", arn, region),
                    (Some(arn), None) => arn.clone(),
                    _ => scope.account_id.clone(),
                };
                Ok(AuthStatus::ok(account_info))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn account_scope(&self) -> albflow_template::Result<AccountScope> {
        Ok(self.caller_scope().await?)
    }

    async fn submit(
        &self,
        template: &Template,
        stack_name: &str,
    ) -> albflow_template::Result<SubmissionOutcome> {
        Ok(self.submit_stack(template, stack_name).await?)
    }

    async fn describe(
        &self,
        stack_name: &str,
    ) -> albflow_template::Result<Option<StackDescription>> {
        Ok(self
            .find_stack(stack_name)
            .await?
            .map(|stack| stack_description(&stack, stack_name)))
    }

    async fn delete(&self, stack_name: &str) -> albflow_template::Result<SubmissionOutcome> {
        Ok(self.delete_stack(stack_name).await?)
    }
}
