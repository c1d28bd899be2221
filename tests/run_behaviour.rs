//! Behavioural scenarios for driving a run end to end.

mod run;
