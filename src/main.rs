fn main() {
    motion_hmi_lib::run()
}
