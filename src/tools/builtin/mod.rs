pub mod agent_control;
pub mod fs;
pub mod git;
pub mod task_ops;

use crate::tools::ToolRegistry;

/// Registers every builtin tool: filesystem, git, task, and session-control.
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(fs::read_file());
    registry.register(fs::list_directory());
    registry.register(fs::search_files());
    registry.register(fs::write_file());
    registry.register(fs::edit_file());

    registry.register(git::git_status());
    registry.register(git::git_diff());

    registry.register(task_ops::create_task());
    registry.register(task_ops::list_tasks());
    registry.register(task_ops::get_ready_tasks());
    registry.register(task_ops::get_current_task());
    registry.register(task_ops::set_current_task());
    registry.register(task_ops::start_task());
    registry.register(task_ops::update_task());
    registry.register(task_ops::complete_task());
    registry.register(task_ops::block_task());
    registry.register(task_ops::add_dependency());
    registry.register(task_ops::add_comment());
    registry.register(task_ops::get_epic_summary());

    registry.register(agent_control::planning_done());
    registry.register(agent_control::tinkering_done());
    registry.register(agent_control::submit_work());
    registry.register(agent_control::approve_task());
    registry.register(agent_control::request_revision());
    registry.register(agent_control::end_session());
    registry.register(agent_control::land_the_plane());
}
